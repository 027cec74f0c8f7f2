//! Coverage data narrowing which functions are under test

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::error::{MutationError, Result};

/// Execution counts per covered function
///
/// Names are either plain (`foo`) or scoped by source file name (`foo.c:foo`)
/// when two units define a function with the same name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CoverageMap {
    functions: Vec<FunctionRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct FunctionRecord {
    name: String,
    count: u64,
}

impl CoverageMap {
    pub fn new(records: impl IntoIterator<Item = (String, u64)>) -> Self {
        Self {
            functions: records
                .into_iter()
                .map(|(name, count)| FunctionRecord { name, count })
                .collect(),
        }
    }

    pub fn covered_functions(&self) -> Vec<(String, u64)> {
        self.functions
            .iter()
            .map(|r| (r.name.clone(), r.count))
            .collect()
    }

    /// Index of the functions with a nonzero execution count
    pub fn executed_functions(&self) -> CoveredFunctions {
        let mut covered = CoveredFunctions::default();
        for (name, count) in self.covered_functions() {
            if count == 0 {
                continue;
            }
            match name.split_once(':') {
                Some((scope, name)) if !scope.is_empty() => {
                    covered
                        .scoped
                        .entry(scope.to_string())
                        .or_default()
                        .insert(name.to_string());
                }
                Some((_, name)) => {
                    covered.unscoped.insert(name.to_string());
                }
                None => {
                    covered.unscoped.insert(name);
                }
            }
        }
        covered
    }
}

/// Executed function names, split by whether they carry a file scope
#[derive(Debug, Default)]
pub struct CoveredFunctions {
    unscoped: HashSet<String>,
    scoped: HashMap<String, HashSet<String>>,
}

impl CoveredFunctions {
    /// `unit_file_name` is the file name of the function's translation unit
    pub fn contains(&self, name: &str, unit_file_name: &str) -> bool {
        self.unscoped.contains(name)
            || self
                .scoped
                .get(unit_file_name)
                .is_some_and(|names| names.contains(name))
    }
}

pub trait CoverageLoader: Send + Sync {
    fn load(&self, executable: &Path, coverage_data: &Path) -> Result<CoverageMap>;
}

/// Reads `{ "functions": [ { "name": "foo", "count": 3 } ] }`
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCoverageLoader;

impl CoverageLoader for JsonCoverageLoader {
    fn load(&self, _executable: &Path, coverage_data: &Path) -> Result<CoverageMap> {
        let content =
            std::fs::read_to_string(coverage_data).map_err(|e| MutationError::ConfigError {
                message: format!(
                    "Cannot read coverage info '{}': {}",
                    coverage_data.display(),
                    e
                ),
            })?;
        serde_json::from_str(&content).map_err(|e| MutationError::ConfigError {
            message: format!(
                "Cannot read coverage info '{}': {}",
                coverage_data.display(),
                e
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_count_is_not_covered() {
        let map = CoverageMap::new(vec![("foo".to_string(), 0), ("bar".to_string(), 2)]);
        let covered = map.executed_functions();
        assert!(!covered.contains("foo", "a.c"));
        assert!(covered.contains("bar", "a.c"));
    }

    #[test]
    fn test_scoped_names_only_match_their_unit() {
        let map = CoverageMap::new(vec![("a.c:helper".to_string(), 1)]);
        let covered = map.executed_functions();
        assert!(covered.contains("helper", "a.c"));
        assert!(!covered.contains("helper", "b.c"));
    }

    #[test]
    fn test_json_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coverage.json");
        std::fs::write(
            &path,
            r#"{ "functions": [ { "name": "main", "count": 1 }, { "name": "foo", "count": 0 } ] }"#,
        )
        .unwrap();

        let map = JsonCoverageLoader.load(Path::new("a.out"), &path).unwrap();
        assert_eq!(
            map.covered_functions(),
            vec![("main".to_string(), 1), ("foo".to_string(), 0)]
        );
    }

    #[test]
    fn test_missing_coverage_file_is_an_error() {
        let result = JsonCoverageLoader.load(Path::new("a.out"), Path::new("/nonexistent.json"));
        assert!(result.is_err());
    }
}
