//! CLI for the mutation testing pipeline

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;

use ir_mutation_testing::runtime::{exit_status, Image, Machine, Selector};
use ir_mutation_testing::{
    Configuration, Diagnostics, Driver, IsolatedSandbox, MutationReport, NullSandbox,
    ProcessSandbox, Program, SandboxKind, Toolchain, Verdict,
};

#[derive(Parser)]
#[command(name = "ir-mutation-testing")]
#[command(author, version, about = "Mutation testing for compiled programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run mutation tests
    Run {
        /// Path to the configuration file
        #[arg(short, long, default_value = "mutation.yaml")]
        config: PathBuf,

        /// Enumerate mutants without executing them
        #[arg(long)]
        dry_run: bool,

        /// Enable verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Execute a linked image (used by mutated executables)
    ExecImage {
        image: PathBuf,

        /// Integer arguments passed to `main`
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<i64>,
    },

    /// Show example configuration
    Example,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            dry_run,
            verbose,
        } => match run_mutations(&config, dry_run, verbose) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("{}: {:#}", "Error".red().bold(), e);
                ExitCode::FAILURE
            }
        },

        Commands::ExecImage { image, args } => exec_image(&image, &args),

        Commands::Example => {
            print_example();
            ExitCode::SUCCESS
        }
    }
}

fn run_mutations(config_path: &Path, dry_run: bool, verbose: bool) -> Result<ExitCode> {
    let mut config = Configuration::load(config_path)?;
    config.dry_run |= dry_run;

    let debug = config.debug || verbose;
    let level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    let diagnostics = Diagnostics::new().with_debug(debug);

    let scratch;
    let work_dir = match &config.work_dir {
        Some(dir) => dir.clone(),
        None => {
            scratch = tempfile::Builder::new().prefix("mutants-").tempdir()?;
            scratch.path().to_path_buf()
        }
    };
    let runtime = match &config.runtime {
        Some(runtime) => runtime.clone(),
        None => std::env::current_exe().context("cannot locate the runtime binary")?,
    };
    let toolchain = Toolchain::new(work_dir, runtime);

    let mut program = Program::load(&config.bitcode)?
        .with_precompiled_objects(config.precompiled_objects.clone())
        .with_dynamic_libraries(config.dynamic_libraries.clone());
    let sandbox: Box<dyn ProcessSandbox> = match config.sandbox {
        SandboxKind::None => Box::new(NullSandbox),
        SandboxKind::Isolated => Box::new(IsolatedSandbox::new()?),
    };
    let filters = config.build_filters(&diagnostics);
    let mutators = config.mutators()?;

    let result = Driver::new(
        &diagnostics,
        &config,
        sandbox.as_ref(),
        &mut program,
        &toolchain,
        &filters,
        &mutators,
    )
    .run()?;

    MutationReport::new(&result).print();

    if result.count(Verdict::Survived) > 0 {
        Ok(ExitCode::from(1)) // Some mutants survived
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn exec_image(path: &Path, args: &[i64]) -> ExitCode {
    let image = match Image::load(path) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(125);
        }
    };
    let selector = Selector::from_env();
    let stdout = std::io::stdout();
    let mut machine = Machine::new(&image, &selector, stdout.lock());

    match machine.run_main(args) {
        Ok(code) => std::process::exit(exit_status(code)),
        Err(trap) => {
            eprintln!("trap: {}", trap);
            std::process::abort();
        }
    }
}

fn print_example() {
    let example = r#"# Example mutation.yaml configuration file

# Original test executable, run once as the sanity check
executable: build/tests

# IR modules to mutate
bitcode:
  - build/math.json
  - build/main.json

# Linked as-is, never mutated
precompiled_objects: []
dynamic_libraries: []

# Optional coverage data; only executed functions are mutated
# coverage_info: build/coverage.json

timeout: 3000          # milliseconds per run
# workers: 8           # defaults to the number of CPUs
# mutant_execution_workers: 16

dry_run: false
skip_sanity_check: false
capture_test_output: true
capture_mutant_output: false

# Regexes matched against source paths; exclusion wins
include_paths: [".*\\.c$"]
exclude_paths: ["Output/.*"]
skip_no_debug_info: true

# Mutator ids or groups (cxx_arithmetic, cxx_comparison, cxx_bitwise,
# cxx_calls, cxx_default)
mutators:
  - cxx_arithmetic
  - cxx_comparison

sandbox: isolated      # none | isolated
# work_dir: build/mutants
"#;

    println!("{}", example);
}
