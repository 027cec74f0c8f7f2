use std::collections::HashMap;
use std::sync::Mutex;

use regex::Regex;

use super::{FunctionFilter, InstructionFilter, MutationFilter};
use crate::error::{MutationError, Result};
use crate::ir::{Function, Instruction, SourceLocation};
use crate::mutation::MutationPoint;

/// Include/exclude regular expressions matched against source paths
///
/// Exclusion wins: a path is skipped if it matches any exclude pattern, or if
/// include patterns exist and it matches none of them. Patterns are searched
/// anywhere in the path. Verdicts are cached per distinct path.
#[derive(Debug, Default)]
pub struct FilePathFilter {
    include_filters: Vec<Regex>,
    exclude_filters: Vec<Regex>,
    cache: Mutex<HashMap<String, bool>>,
}

impl FilePathFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(&mut self, pattern: &str) -> Result<()> {
        let regex = compile(pattern)?;
        self.include_filters.push(regex);
        self.clear_cache();
        Ok(())
    }

    pub fn exclude(&mut self, pattern: &str) -> Result<()> {
        let regex = compile(pattern)?;
        self.exclude_filters.push(regex);
        self.clear_cache();
        Ok(())
    }

    pub fn should_skip_path(&self, source_file_path: &str) -> bool {
        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(&skip) = cache.get(source_file_path) {
            return skip;
        }
        let skip = self.evaluate(source_file_path);
        cache.insert(source_file_path.to_string(), skip);
        skip
    }

    fn evaluate(&self, path: &str) -> bool {
        if self.exclude_filters.iter().any(|r| r.is_match(path)) {
            return true;
        }
        !self.include_filters.is_empty() && !self.include_filters.iter().any(|r| r.is_match(path))
    }

    fn should_skip_location(&self, location: Option<&SourceLocation>) -> bool {
        let path = location.map(|l| l.file.as_str()).unwrap_or_default();
        self.should_skip_path(path)
    }

    fn clear_cache(&mut self) {
        self.cache
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| MutationError::ConfigError {
        message: format!("Invalid regex '{}': {}", pattern, e),
    })
}

impl MutationFilter for FilePathFilter {
    fn name(&self) -> &str {
        "file path"
    }

    fn should_skip(&self, point: &MutationPoint) -> bool {
        self.should_skip_location(point.location.as_ref())
    }
}

impl FunctionFilter for FilePathFilter {
    fn name(&self) -> &str {
        "file path"
    }

    fn should_skip(&self, function: &Function) -> bool {
        self.should_skip_location(function.location.as_ref())
    }
}

impl InstructionFilter for FilePathFilter {
    fn name(&self) -> &str {
        "file path"
    }

    fn should_skip(&self, instruction: &Instruction) -> bool {
        self.should_skip_location(instruction.location.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclude_wins_over_include() {
        let mut filter = FilePathFilter::new();
        filter.include(".*cpp").unwrap();
        filter.include(".*cpp").unwrap();
        filter.exclude("Output/.*").unwrap();

        assert!(filter.should_skip_path("Output/main.cpp"));
        assert!(!filter.should_skip_path("src/main.cpp"));
    }

    #[test]
    fn test_include_only_skips_non_matching() {
        let mut filter = FilePathFilter::new();
        filter.include("src/").unwrap();
        assert!(!filter.should_skip_path("/project/src/a.c"));
        assert!(filter.should_skip_path("/project/include/a.h"));
    }

    #[test]
    fn test_no_patterns_keeps_everything() {
        let filter = FilePathFilter::new();
        assert!(!filter.should_skip_path("anything.c"));
        assert!(!filter.should_skip_path(""));
    }

    #[test]
    fn test_verdict_is_cached_per_path() {
        let mut filter = FilePathFilter::new();
        filter.exclude("tests/").unwrap();
        assert!(filter.should_skip_path("tests/a.c"));
        assert!(filter.should_skip_path("tests/a.c"));
        assert_eq!(filter.cache.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let mut filter = FilePathFilter::new();
        let error = filter.exclude("(unclosed").unwrap_err();
        assert!(error.to_string().contains("Invalid regex '(unclosed'"));
    }

    #[test]
    fn test_mutation_point_location_is_checked() {
        use crate::ir::InstructionAddress;
        use crate::mutation::FunctionRef;

        let mut filter = FilePathFilter::new();
        filter.exclude("Output/.*").unwrap();
        let point = |file: &str| {
            MutationPoint::new(
                "cxx_eq_to_ne",
                FunctionRef {
                    module: 0,
                    name: "equal".to_string(),
                },
                InstructionAddress { block: 0, index: 0 },
                Some(SourceLocation::new(file, 2, 12)),
                "Replaced == with !=",
            )
        };
        assert!(MutationFilter::should_skip(&filter, &point("Output/sandbox/main.cpp")));
        assert!(!MutationFilter::should_skip(&filter, &point("sandbox/main.cpp")));
    }
}
