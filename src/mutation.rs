//! Mutation points and the functions they are found in

use std::fmt;

use crate::ir::{stable_hash, InstructionAddress, SourceLocation};

/// Identifies a function by its owning module and symbol name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionRef {
    /// Index of the module in its [`Program`](crate::program::Program)
    pub module: usize,
    pub name: String,
}

/// A function paired with a test that reaches it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionUnderTest {
    pub function: FunctionRef,
    /// Index of the test in the discovered test list
    pub test: usize,
    pub weight: u32,
    /// Instructions eligible for mutation, filled in by instruction selection
    pub selected_instructions: Vec<InstructionAddress>,
}

impl FunctionUnderTest {
    pub fn new(function: FunctionRef, test: usize) -> Self {
        Self {
            function,
            test,
            weight: 1,
            selected_instructions: Vec::new(),
        }
    }
}

/// A location plus the transformation a mutator would apply there
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationPoint {
    pub mutator: String,
    pub function: FunctionRef,
    pub address: InstructionAddress,
    pub location: Option<SourceLocation>,
    /// Human-readable summary, e.g. "Replaced - with +"
    pub replacement: String,
    /// Indices of the tests that reach this point
    pub tests: Vec<usize>,
    applied: bool,
}

impl MutationPoint {
    pub fn new(
        mutator: impl Into<String>,
        function: FunctionRef,
        address: InstructionAddress,
        location: Option<SourceLocation>,
        replacement: impl Into<String>,
    ) -> Self {
        Self {
            mutator: mutator.into(),
            function,
            address,
            location,
            replacement: replacement.into(),
            tests: Vec::new(),
            applied: false,
        }
    }

    /// Unique identity of the point within a program
    pub fn identifier(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.mutator, self.function.module, self.function.name, self.address
        )
    }

    /// Name shown to users: mutator id and source span
    ///
    /// Points without debug info fall back to their IR position. Two points
    /// expanded from the same source span share it.
    pub fn user_identifier(&self) -> String {
        match &self.location {
            Some(location) => format!("{}:{}", self.mutator, location),
            None => format!(
                "{}:{}:{}",
                self.mutator, self.function.name, self.address
            ),
        }
    }

    /// Environment variable that activates this mutant, and only this one
    ///
    /// A valid shell identifier, so it survives `/bin/sh` launchers. The hash
    /// of [`identifier`](Self::identifier) keeps points that share a source
    /// span apart.
    pub fn selector(&self) -> String {
        let readable: String = self
            .user_identifier()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!(
            "MUTANT_{}_{:016x}",
            readable,
            stable_hash(&self.identifier())
        )
    }

    /// Symbol of the clone that carries this mutation
    pub fn mutated_function_name(&self) -> String {
        format!(
            "{}.mutant.{}.{}",
            self.function.name, self.mutator, self.address
        )
    }

    /// Symbol of the preserved, unmutated copy of `function`
    pub fn original_function_name(function: &str) -> String {
        format!("{}.original", function)
    }

    pub fn is_applied(&self) -> bool {
        self.applied
    }

    pub fn mark_applied(&mut self) {
        self.applied = true;
    }
}

impl fmt::Display for MutationPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{}: {} [{}]", location, self.replacement, self.mutator),
            None => write!(
                f,
                "{}@{}: {} [{}]",
                self.function.name, self.address, self.replacement, self.mutator
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn point(location: Option<SourceLocation>) -> MutationPoint {
        MutationPoint::new(
            "cxx_sub_to_add",
            FunctionRef {
                module: 0,
                name: "sub".to_string(),
            },
            InstructionAddress { block: 0, index: 0 },
            location,
            "Replaced - with +",
        )
    }

    #[test]
    fn test_user_identifier_uses_source_span() {
        let point = point(Some(SourceLocation::new("/src/sample.c", 2, 12)));
        assert_eq!(point.user_identifier(), "cxx_sub_to_add:/src/sample.c:2:12");
        assert_eq!(point.to_string(), "/src/sample.c:2:12: Replaced - with + [cxx_sub_to_add]");
    }

    #[test]
    fn test_user_identifier_without_debug_info() {
        let point = point(None);
        assert_eq!(point.user_identifier(), "cxx_sub_to_add:sub:0_0");
    }

    #[test]
    fn test_selector_is_a_shell_identifier() {
        let point = point(Some(SourceLocation::new("/src/sample.c", 2, 12)));
        let selector = point.selector();
        assert!(selector.starts_with("MUTANT_cxx_sub_to_add__src_sample_c_2_12_"));
        assert!(selector.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        assert_eq!(selector, point.clone().selector());
    }

    #[test]
    fn test_points_sharing_a_span_get_distinct_selectors() {
        let span = Some(SourceLocation::new("macro.h", 3, 7));
        let checked = point(span.clone());
        let mut unchecked = point(span);
        unchecked.function.name = "unchecked".to_string();

        assert_eq!(checked.user_identifier(), unchecked.user_identifier());
        assert_ne!(checked.selector(), unchecked.selector());
    }

    #[test]
    fn test_clone_names_are_distinct() {
        let point = point(None);
        assert_eq!(point.mutated_function_name(), "sub.mutant.cxx_sub_to_add.0_0");
        assert_eq!(MutationPoint::original_function_name("sub"), "sub.original");
    }

    #[test]
    fn test_applied_flag() {
        let mut point = point(None);
        assert!(!point.is_applied());
        point.mark_applied();
        assert!(point.is_applied());
    }
}
