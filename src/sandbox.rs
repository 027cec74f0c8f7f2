//! Isolation applied to every child process the engine launches

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

use crate::error::Result;

pub trait ProcessSandbox: Send + Sync {
    fn name(&self) -> &str;

    /// Constrain `command` before it is spawned
    fn prepare(&self, command: &mut Command) -> Result<()>;
}

/// Runs children with the parent's working directory and environment
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSandbox;

impl ProcessSandbox for NullSandbox {
    fn name(&self) -> &str {
        "none"
    }

    fn prepare(&self, _command: &mut Command) -> Result<()> {
        Ok(())
    }
}

/// Runs children in an empty scratch directory with only `PATH` inherited
#[derive(Debug)]
pub struct IsolatedSandbox {
    directory: TempDir,
}

impl IsolatedSandbox {
    pub fn new() -> Result<Self> {
        let directory = tempfile::Builder::new()
            .prefix("mutant-sandbox-")
            .tempdir()?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        self.directory.path()
    }
}

impl ProcessSandbox for IsolatedSandbox {
    fn name(&self) -> &str {
        "isolated"
    }

    fn prepare(&self, command: &mut Command) -> Result<()> {
        command.current_dir(self.directory.path()).env_clear();
        if let Some(path) = std::env::var_os("PATH") {
            command.env("PATH", path);
        }
        Ok(())
    }
}
