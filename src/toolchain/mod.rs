//! Lowering modules to object files and linking them into an executable

mod compiler;
mod linker;

pub use compiler::Compiler;
pub use linker::Linker;

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::ir::Module;
use crate::parallelization::{ProgressCounter, Task};

/// Compiler and linker sharing one output directory
#[derive(Debug, Clone)]
pub struct Toolchain {
    compiler: Compiler,
    linker: Linker,
}

impl Toolchain {
    /// `runtime` is the binary that executes linked images
    pub fn new(output_dir: impl Into<PathBuf>, runtime: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        Self {
            compiler: Compiler::new(output_dir.clone()),
            linker: Linker::new(output_dir, runtime),
        }
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    pub fn linker(&self) -> &Linker {
        &self.linker
    }

    /// Compile and link `modules` as they are, e.g. to build the baseline program
    pub fn build(&self, modules: &[Module], output_name: &str) -> Result<PathBuf> {
        let objects = modules
            .iter()
            .map(|module| self.compiler.compile(module))
            .collect::<Result<Vec<_>>>()?;
        self.linker.link(&objects, output_name)
    }

    pub fn output_dir(&self) -> &Path {
        self.compiler.output_dir()
    }
}

/// Compiles each module to an object file
pub struct OriginalCompilationTask<'a> {
    toolchain: &'a Toolchain,
}

impl<'a> OriginalCompilationTask<'a> {
    pub fn new(toolchain: &'a Toolchain) -> Self {
        Self { toolchain }
    }
}

impl<'a> Task for OriginalCompilationTask<'a> {
    type In = &'a Module;
    type Out = PathBuf;

    fn run(
        &mut self,
        items: Vec<&'a Module>,
        storage: &mut Vec<PathBuf>,
        counter: &ProgressCounter,
    ) -> Result<()> {
        for module in items {
            storage.push(self.toolchain.compiler().compile(module)?);
            counter.increment();
        }
        Ok(())
    }
}
