//! Configuration file parsing for a mutation testing run

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::diagnostics::Diagnostics;
use crate::error::MutationError;
use crate::filters::{FilePathFilter, Filters, NoDebugInfoFilter};
use crate::mutator::{mutators_from_ids, Mutator};

/// Which isolation mutant processes run under
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxKind {
    #[default]
    None,
    Isolated,
}

/// Run parameters, read-only once loaded
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Original test executable, used for the sanity check and coverage
    pub executable: PathBuf,
    /// Modules to mutate
    #[serde(default)]
    pub bitcode: Vec<PathBuf>,
    #[serde(default)]
    pub precompiled_objects: Vec<PathBuf>,
    #[serde(default)]
    pub dynamic_libraries: Vec<PathBuf>,
    #[serde(default)]
    pub coverage_info: Option<PathBuf>,

    /// Timeout in milliseconds for each test run
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Falls back to `workers` when omitted
    #[serde(default)]
    pub mutant_execution_workers: Option<usize>,

    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub skip_sanity_check: bool,
    #[serde(default)]
    pub capture_test_output: bool,
    #[serde(default)]
    pub capture_mutant_output: bool,

    /// Regexes a source path must match to be mutated
    #[serde(default)]
    pub include_paths: Vec<String>,
    /// Regexes that exclude a source path from mutation
    #[serde(default)]
    pub exclude_paths: Vec<String>,
    /// Skip code that carries no debug location
    #[serde(default)]
    pub skip_no_debug_info: bool,

    /// Mutator ids or group names; empty selects the default set
    #[serde(default)]
    pub mutators: Vec<String>,

    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub sandbox: SandboxKind,
    /// Where objects and the mutated executable are written; a temporary
    /// directory when omitted
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    /// Binary that runs linked images; the current executable when omitted
    #[serde(default)]
    pub runtime: Option<PathBuf>,
}

fn default_timeout() -> u64 {
    3000
}

fn default_workers() -> usize {
    num_cpus::get()
}

impl Configuration {
    /// Configuration with defaults for everything but the executable
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            bitcode: Vec::new(),
            precompiled_objects: Vec::new(),
            dynamic_libraries: Vec::new(),
            coverage_info: None,
            timeout: default_timeout(),
            workers: default_workers(),
            mutant_execution_workers: None,
            dry_run: false,
            skip_sanity_check: false,
            capture_test_output: false,
            capture_mutant_output: false,
            include_paths: Vec::new(),
            exclude_paths: Vec::new(),
            skip_no_debug_info: false,
            mutators: Vec::new(),
            debug: false,
            sandbox: SandboxKind::None,
            work_dir: None,
            runtime: None,
        }
    }

    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self, MutationError> {
        let content = std::fs::read_to_string(path).map_err(|e| MutationError::ConfigError {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        let config: Configuration =
            serde_yaml::from_str(&content).map_err(|e| MutationError::ConfigError {
                message: format!("Failed to parse config file '{}': {}", path.display(), e),
            })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MutationError> {
        if self.workers == 0 || self.mutant_execution_workers == Some(0) {
            return Err(MutationError::ConfigError {
                message: "worker counts must be at least 1".to_string(),
            });
        }
        if self.timeout == 0 {
            return Err(MutationError::ConfigError {
                message: "timeout must be at least 1ms".to_string(),
            });
        }
        mutators_from_ids(&self.mutators).map(|_| ())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    pub fn mutant_execution_workers(&self) -> usize {
        self.mutant_execution_workers.unwrap_or(self.workers)
    }

    pub fn mutators(&self) -> Result<Vec<Box<dyn Mutator>>, MutationError> {
        mutators_from_ids(&self.mutators)
    }

    /// Filters described by this configuration
    ///
    /// Invalid path patterns are reported and skipped.
    pub fn build_filters(&self, diagnostics: &Diagnostics) -> Filters {
        let mut filters = Filters::new();
        if self.skip_no_debug_info {
            filters.add_all(NoDebugInfoFilter);
        }

        if !self.include_paths.is_empty() || !self.exclude_paths.is_empty() {
            let mut path_filter = FilePathFilter::new();
            for pattern in &self.include_paths {
                if let Err(e) = path_filter.include(pattern) {
                    diagnostics.warning(e.to_string());
                }
            }
            for pattern in &self.exclude_paths {
                if let Err(e) = path_filter.exclude(pattern) {
                    diagnostics.warning(e.to_string());
                }
            }
            filters.add_all(path_filter);
        }
        filters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;

    #[test]
    fn test_parse_config() {
        let yaml = r#"
executable: build/tests
bitcode:
  - build/main.json
  - build/math.json
timeout: 500
workers: 2
mutant_execution_workers: 8
sandbox: isolated
include_paths: [".*cpp"]
exclude_paths: ["Output/.*"]
mutators: [cxx_arithmetic]
"#;

        let config: Configuration = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.executable, PathBuf::from("build/tests"));
        assert_eq!(config.bitcode.len(), 2);
        assert_eq!(config.timeout(), Duration::from_millis(500));
        assert_eq!(config.workers, 2);
        assert_eq!(config.mutant_execution_workers(), 8);
        assert_eq!(config.sandbox, SandboxKind::Isolated);
        assert_eq!(config.mutators().unwrap().len(), 5);
    }

    #[test]
    fn test_defaults() {
        let config: Configuration = serde_yaml::from_str("executable: a.out").unwrap();
        assert_eq!(config.timeout, 3000);
        assert_eq!(config.workers, num_cpus::get());
        assert_eq!(config.mutant_execution_workers(), config.workers);
        assert!(!config.dry_run);
        assert!(!config.skip_sanity_check);
        assert!(config.coverage_info.is_none());
        assert_eq!(config.sandbox, SandboxKind::None);
    }

    #[test]
    fn test_executable_is_required() {
        assert!(serde_yaml::from_str::<Configuration>("timeout: 10").is_err());
    }

    #[test]
    fn test_load_rejects_zero_workers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mutation.yaml");
        std::fs::write(&path, "executable: a.out\nworkers: 0\n").unwrap();
        let error = Configuration::load(&path).unwrap_err();
        assert!(error.to_string().contains("at least 1"));
    }

    #[test]
    fn test_load_rejects_unknown_mutator() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mutation.yaml");
        std::fs::write(&path, "executable: a.out\nmutators: [cxx_nope]\n").unwrap();
        assert!(matches!(
            Configuration::load(&path),
            Err(MutationError::UnknownMutator { .. })
        ));
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let mut config = Configuration::new("a.out");
        config.include_paths = vec!["(".to_string(), ".*cpp".to_string()];
        let diagnostics = Diagnostics::capturing();
        let filters = config.build_filters(&diagnostics);

        assert_eq!(filters.mutation_filters.len(), 1);
        let warnings = diagnostics.texts(Severity::Warning);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Invalid regex '('"));
    }
}
