//! Mutation testing for compiled programs
//!
//! This library injects small semantic changes into a program's IR modules,
//! builds every mutant into a single executable next to the unmodified code,
//! runs that executable once per mutant and reports which mutants the test
//! suite detected. A run is configured with a YAML file.
//!
//! # Example Configuration
//!
//! ```yaml
//! executable: build/tests
//! bitcode:
//!   - build/math.json
//!   - build/main.json
//! timeout: 3000
//! mutators: [cxx_arithmetic, cxx_comparison]
//! exclude_paths: ["Output/.*"]
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use ir_mutation_testing::{
//!     Configuration, Diagnostics, Driver, MutationReport, NullSandbox, Program, Toolchain,
//! };
//! use std::path::Path;
//!
//! let config = Configuration::load(Path::new("mutation.yaml")).unwrap();
//! let diagnostics = Diagnostics::new();
//! let mut program = Program::load(&config.bitcode).unwrap();
//! let toolchain = Toolchain::new("/tmp/mutants", "/usr/local/bin/ir-mutation-testing");
//! let filters = config.build_filters(&diagnostics);
//! let mutators = config.mutators().unwrap();
//!
//! let result = Driver::new(
//!     &diagnostics, &config, &NullSandbox, &mut program, &toolchain, &filters, &mutators,
//! )
//! .run()
//! .unwrap();
//! MutationReport::new(&result).print();
//! ```

pub mod config;
pub mod coverage;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod execution;
pub mod filters;
pub mod finder;
pub mod ir;
pub mod mutation;
pub mod mutator;
pub mod parallelization;
pub mod program;
pub mod report;
pub mod result;
pub mod runtime;
pub mod sandbox;
pub mod synthesis;
pub mod test_framework;
pub mod toolchain;

// Re-export main types at crate root
pub use config::{Configuration, SandboxKind};
pub use diagnostics::Diagnostics;
pub use driver::Driver;
pub use error::{MutationError, Result};
pub use execution::{ExecutionResult, ExecutionStatus};
pub use mutation::MutationPoint;
pub use program::Program;
pub use report::MutationReport;
pub use result::{MutationResult, RunResult, Verdict};
pub use sandbox::{IsolatedSandbox, NullSandbox, ProcessSandbox};
pub use toolchain::Toolchain;
