//! The program under mutation: IR modules plus precompiled inputs

use std::path::PathBuf;

use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::ir::{Function, Module};
use crate::mutation::FunctionRef;

/// Owns every IR module of the program
///
/// Modules are only changed in place by the synthesis stages of a run.
#[derive(Debug, Default)]
pub struct Program {
    modules: Vec<Module>,
    precompiled_objects: Vec<PathBuf>,
    dynamic_libraries: Vec<PathBuf>,
}

impl Program {
    pub fn new(modules: Vec<Module>) -> Self {
        Self {
            modules,
            ..Self::default()
        }
    }

    /// Load all bitcode files; any unreadable module is fatal
    pub fn load(bitcode_paths: &[PathBuf]) -> Result<Self> {
        let modules = bitcode_paths
            .iter()
            .map(|path| Module::load(path))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(modules))
    }

    /// Object files linked as-is, without IR
    pub fn with_precompiled_objects(mut self, objects: Vec<PathBuf>) -> Self {
        self.precompiled_objects = objects;
        self
    }

    pub fn with_dynamic_libraries(mut self, libraries: Vec<PathBuf>) -> Self {
        self.dynamic_libraries = libraries;
        self
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn modules_mut(&mut self) -> &mut [Module] {
        &mut self.modules
    }

    pub fn precompiled_objects(&self) -> &[PathBuf] {
        &self.precompiled_objects
    }

    pub fn dynamic_library_paths(&self) -> &[PathBuf] {
        &self.dynamic_libraries
    }

    pub fn function(&self, function: &FunctionRef) -> Option<&Function> {
        self.modules
            .get(function.module)
            .and_then(|module| module.function(&function.name))
    }

    /// Every function defined (not merely declared) in the program
    pub fn defined_functions(&self) -> impl Iterator<Item = (FunctionRef, &Module, &Function)> {
        self.modules.iter().enumerate().flat_map(|(index, module)| {
            module
                .functions
                .iter()
                .filter(|function| !function.is_declaration())
                .map(move |function| {
                    (
                        FunctionRef {
                            module: index,
                            name: function.name.clone(),
                        },
                        module,
                        function,
                    )
                })
        })
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.modules
            .iter()
            .any(|module| module.function(name).is_some_and(|f| !f.is_declaration()))
    }

    /// Load the dynamic libraries as extra link inputs
    ///
    /// A library that cannot be loaded is reported and skipped.
    pub fn load_dynamic_libraries(&self, diagnostics: &Diagnostics) -> Vec<Module> {
        let mut loaded = Vec::new();
        for path in &self.dynamic_libraries {
            diagnostics.debug(format!("Loading dynamic library {}", path.display()));
            match Module::load(path) {
                Ok(module) => loaded.push(module),
                Err(e) => diagnostics.warning(format!(
                    "Cannot load dynamic library '{}': {}",
                    path.display(),
                    e
                )),
            }
        }
        loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;
    use crate::error::MutationError;
    use crate::ir::{FunctionBuilder, Value};

    fn constant(name: &str, value: i64) -> crate::ir::Function {
        let mut builder = FunctionBuilder::new(name, 0);
        builder.ret(Value::Const(value));
        builder.build()
    }

    #[test]
    fn test_defined_functions_skip_declarations() {
        let mut declared = constant("ext", 0);
        declared.strip_body();
        let program = Program::new(vec![
            Module::new("a", "a.c").with_function(constant("one", 1)),
            Module::new("b", "b.c")
                .with_function(declared)
                .with_function(constant("two", 2)),
        ]);

        let names: Vec<_> = program
            .defined_functions()
            .map(|(r, _, _)| (r.module, r.name))
            .collect();
        assert_eq!(names, vec![(0, "one".to_string()), (1, "two".to_string())]);
        assert!(program.has_function("two"));
        assert!(!program.has_function("ext"));
    }

    #[test]
    fn test_unreadable_bitcode_is_fatal() {
        let result = Program::load(&[PathBuf::from("/nonexistent/module.bc.json")]);
        assert!(matches!(result, Err(MutationError::BitcodeReadError { .. })));
    }

    #[test]
    fn test_missing_dynamic_library_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("libgood.json");
        Module::new("good", "good.c")
            .with_function(constant("helper", 3))
            .save(&good)
            .unwrap();

        let program = Program::new(Vec::new())
            .with_dynamic_libraries(vec![good, dir.path().join("libmissing.json")]);
        let diagnostics = Diagnostics::capturing();
        let loaded = program.load_dynamic_libraries(&diagnostics);

        assert_eq!(loaded.len(), 1);
        let warnings = diagnostics.texts(Severity::Warning);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Cannot load dynamic library"));
    }
}
