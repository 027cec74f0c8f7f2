//! Error types for the mutation pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a mutation testing run
///
/// Per-mutant outcomes (failed, crashed, timed out) are not errors; they are
/// recorded in an [`ExecutionResult`](crate::execution::ExecutionResult).
#[derive(Debug, Error)]
pub enum MutationError {
    /// A bitcode file couldn't be read from disk
    #[error("Failed to read bitcode '{}': {error}", path.display())]
    BitcodeReadError { path: PathBuf, error: String },

    /// A bitcode file was read but is not a valid module
    #[error("Failed to parse bitcode '{}': {error}", path.display())]
    BitcodeParseError { path: PathBuf, error: String },

    /// Lowering a module to an object file failed
    #[error("Failed to compile module '{module}': {error}")]
    CompileError { module: String, error: String },

    /// Object files couldn't be linked into an executable
    #[error("Link failed: {reason}")]
    LinkError { reason: String },

    /// A linked image couldn't be loaded by the runtime
    #[error("Failed to load image '{}': {error}", path.display())]
    ImageError { path: PathBuf, error: String },

    /// A mutation couldn't be applied to its mutated clone
    #[error("Failed to apply mutation '{mutation}': {reason}")]
    FailedToApply { mutation: String, reason: String },

    /// Mutator id is not registered
    #[error("Unknown mutator '{id}'\n  Available mutators: {}", available.join(", "))]
    UnknownMutator { id: String, available: Vec<String> },

    /// A child process couldn't be started or waited on
    #[error("Failed to execute '{}': {error}", program.display())]
    ProcessError { program: PathBuf, error: String },

    /// A worker task aborted its shard
    #[error("Task '{stage}' failed: {error}")]
    TaskFailed { stage: String, error: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, MutationError>;
