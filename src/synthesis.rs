//! Building mutants into the program
//!
//! Synthesis runs in four steps over the modules that own mutation points:
//! clone every mutated function (one `.original` copy plus one copy per
//! point), drop the bodies of the mutant copies, turn each mutated function
//! into a trampoline stub, and finally apply every mutation to its copy. After
//! the last step every point is applied and each mutated function dispatches
//! through its trampoline.

use crate::diagnostics::Diagnostics;
use crate::error::{MutationError, Result};
use crate::ir::{Function, FunctionBuilder, Module, Trampoline, TrampolineTarget, Value};
use crate::mutation::MutationPoint;
use crate::mutator::Mutator;
use crate::parallelization::{ProgressCounter, Task};

/// Names of the mutated functions of a module, in first-seen order
fn mutated_functions(module: &Module) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for point in &module.mutations {
        if !names.contains(&point.function.name) {
            names.push(point.function.name.clone());
        }
    }
    names
}

/// Mutants of a module, deduplicated by clone name
fn mutant_clones(module: &Module) -> Vec<&MutationPoint> {
    let mut seen = std::collections::HashSet::new();
    module
        .mutations
        .iter()
        .filter(|point| seen.insert(point.mutated_function_name()))
        .collect()
}

fn missing_function(stage: &str, module: &Module, name: &str) -> MutationError {
    MutationError::TaskFailed {
        stage: stage.to_string(),
        error: format!("module '{}' has no function '{}'", module.name, name),
    }
}

/// Adds the `.original` copy and one mutant copy per point
pub struct CloneMutatedFunctionsTask<'a> {
    diagnostics: &'a Diagnostics,
}

impl<'a> CloneMutatedFunctionsTask<'a> {
    pub fn new(diagnostics: &'a Diagnostics) -> Self {
        Self { diagnostics }
    }
}

impl<'a> Task for CloneMutatedFunctionsTask<'a> {
    type In = &'a mut Module;
    type Out = ();

    fn run(
        &mut self,
        items: Vec<&'a mut Module>,
        _: &mut Vec<()>,
        counter: &ProgressCounter,
    ) -> Result<()> {
        for module in items {
            let mut clones: Vec<Function> = Vec::new();
            for name in mutated_functions(module) {
                let function = module
                    .function(&name)
                    .ok_or_else(|| missing_function("cloning functions", module, &name))?;
                clones.push(function.clone_as(MutationPoint::original_function_name(&name)));
            }
            for point in mutant_clones(module) {
                let function = module
                    .function(&point.function.name)
                    .ok_or_else(|| missing_function("cloning functions", module, &point.function.name))?;
                clones.push(function.clone_as(point.mutated_function_name()));
            }
            self.diagnostics.debug(format!(
                "{}: {} clone(s)",
                module.name,
                clones.len()
            ));
            module.functions.extend(clones);
            counter.increment();
        }
        Ok(())
    }
}

/// Turns every mutated function into a declaration
pub struct DeleteOriginalFunctionsTask<'a> {
    diagnostics: &'a Diagnostics,
}

impl<'a> DeleteOriginalFunctionsTask<'a> {
    pub fn new(diagnostics: &'a Diagnostics) -> Self {
        Self { diagnostics }
    }
}

impl<'a> Task for DeleteOriginalFunctionsTask<'a> {
    type In = &'a mut Module;
    type Out = ();

    fn run(
        &mut self,
        items: Vec<&'a mut Module>,
        _: &mut Vec<()>,
        counter: &ProgressCounter,
    ) -> Result<()> {
        for module in items {
            for name in mutated_functions(module) {
                let function = module
                    .function_mut(&name)
                    .ok_or_else(|| MutationError::TaskFailed {
                        stage: "deleting original functions".to_string(),
                        error: format!("no function '{}'", name),
                    })?;
                function.strip_body();
                self.diagnostics
                    .debug(format!("{}: dropped body of '{}'", module.name, name));
            }
            counter.increment();
        }
        Ok(())
    }
}

/// Registers a trampoline for each mutated function and gives the function a
/// body that dispatches through it
pub struct InsertMutationTrampolinesTask<'a> {
    diagnostics: &'a Diagnostics,
}

impl<'a> InsertMutationTrampolinesTask<'a> {
    pub fn new(diagnostics: &'a Diagnostics) -> Self {
        Self { diagnostics }
    }
}

impl<'a> Task for InsertMutationTrampolinesTask<'a> {
    type In = &'a mut Module;
    type Out = ();

    fn run(
        &mut self,
        items: Vec<&'a mut Module>,
        _: &mut Vec<()>,
        counter: &ProgressCounter,
    ) -> Result<()> {
        for module in items {
            for name in mutated_functions(module) {
                let mutants: Vec<TrampolineTarget> = mutant_clones(module)
                    .into_iter()
                    .filter(|point| point.function.name == name)
                    .map(|point| TrampolineTarget {
                        selector: point.selector(),
                        function: point.mutated_function_name(),
                    })
                    .collect();
                self.diagnostics.debug(format!(
                    "{}: trampoline for '{}' with {} mutant(s)",
                    module.name,
                    name,
                    mutants.len()
                ));

                let function = module
                    .function_mut(&name)
                    .ok_or_else(|| MutationError::TaskFailed {
                        stage: "inserting trampolines".to_string(),
                        error: format!("no function '{}'", name),
                    })?;
                *function = trampoline_stub(function);

                module.trampolines.push(Trampoline {
                    original: MutationPoint::original_function_name(&name),
                    function: name,
                    mutants,
                });
            }
            counter.increment();
        }
        Ok(())
    }
}

fn trampoline_stub(function: &Function) -> Function {
    let mut builder = FunctionBuilder::new(function.name.clone(), function.params);
    let args = (0..function.params).map(Value::Param).collect();
    let value = builder.dispatch(function.name.clone(), args);
    builder.ret(value);
    let mut stub = builder.build();
    stub.location = function.location.clone();
    stub
}

/// Applies each point to its mutant copy and marks it applied
///
/// Holds the whole module list, so it runs as a single instance.
pub struct ApplyMutationTask<'a> {
    modules: &'a mut [Module],
    mutators: &'a [Box<dyn Mutator>],
}

impl<'a> ApplyMutationTask<'a> {
    pub fn new(modules: &'a mut [Module], mutators: &'a [Box<dyn Mutator>]) -> Self {
        Self { modules, mutators }
    }

    fn apply(&mut self, point: &MutationPoint) -> Result<()> {
        let failed = |reason: String| MutationError::FailedToApply {
            mutation: point.user_identifier(),
            reason,
        };
        let mutator = self
            .mutators
            .iter()
            .find(|m| m.id() == point.mutator)
            .ok_or_else(|| failed(format!("mutator '{}' is not enabled", point.mutator)))?;
        let clone = point.mutated_function_name();
        let function = self
            .modules
            .get_mut(point.function.module)
            .and_then(|module| module.function_mut(&clone))
            .ok_or_else(|| failed(format!("no mutant copy '{}'", clone)))?;
        mutator.apply(point, function)
    }
}

impl<'a> Task for ApplyMutationTask<'a> {
    type In = &'a mut MutationPoint;
    type Out = ();

    fn run(
        &mut self,
        items: Vec<&'a mut MutationPoint>,
        _: &mut Vec<()>,
        counter: &ProgressCounter,
    ) -> Result<()> {
        for point in items {
            self.apply(point)?;
            point.mark_applied();
            counter.increment();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, InstructionAddress, InstructionKind};
    use crate::mutation::FunctionRef;
    use crate::mutator::mutators_from_ids;
    use crate::parallelization::TaskExecutor;
    use pretty_assertions::assert_eq;

    fn module_with_mutation() -> (Module, MutationPoint) {
        let mut builder = FunctionBuilder::new("sub", 2);
        builder.located("sample.c", 1, 1).at(2, 12);
        let diff = builder.binary(BinaryOp::Sub, Value::Param(0), Value::Param(1));
        builder.ret(diff);
        let mut module = Module::new("sample", "sample.c").with_function(builder.build());

        let point = MutationPoint::new(
            "cxx_sub_to_add",
            FunctionRef {
                module: 0,
                name: "sub".to_string(),
            },
            InstructionAddress { block: 0, index: 0 },
            module.functions[0].instructions().next().and_then(|(_, i)| i.location.clone()),
            "Replaced - with +",
        );
        module.add_mutation(point.clone());
        (module, point)
    }

    fn synthesize(diagnostics: &Diagnostics, modules: &mut [Module]) {
        TaskExecutor::new(diagnostics, "Cloning", vec![CloneMutatedFunctionsTask::new(diagnostics)])
            .discard(modules.iter_mut().collect())
            .unwrap();
        TaskExecutor::new(diagnostics, "Deleting", vec![DeleteOriginalFunctionsTask::new(diagnostics)])
            .discard(modules.iter_mut().collect())
            .unwrap();
        TaskExecutor::new(
            diagnostics,
            "Trampolines",
            vec![InsertMutationTrampolinesTask::new(diagnostics)],
        )
        .discard(modules.iter_mut().collect())
        .unwrap();
    }

    #[test]
    fn test_clone_delete_and_trampoline() {
        let diagnostics = Diagnostics::capturing();
        let (module, point) = module_with_mutation();
        let mut modules = vec![module];
        synthesize(&diagnostics, &mut modules);

        let module = &modules[0];
        let names: Vec<&str> = module.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["sub", "sub.original", "sub.mutant.cxx_sub_to_add.0_0"]
        );
        assert_eq!(
            module.trampolines,
            vec![Trampoline {
                function: "sub".to_string(),
                original: "sub.original".to_string(),
                mutants: vec![TrampolineTarget {
                    selector: point.selector(),
                    function: point.mutated_function_name(),
                }],
            }]
        );

        let stub = module.function("sub").unwrap();
        assert!(matches!(
            stub.blocks[0].instructions[0].kind,
            InstructionKind::Dispatch { .. }
        ));
        assert_eq!(stub.params, 2);
    }

    #[test]
    fn test_apply_marks_points() {
        let diagnostics = Diagnostics::capturing();
        let (module, point) = module_with_mutation();
        let mut modules = vec![module];
        synthesize(&diagnostics, &mut modules);

        let mutators = mutators_from_ids(&[]).unwrap();
        let mut points = vec![point];
        TaskExecutor::new(
            &diagnostics,
            "Applying mutations",
            vec![ApplyMutationTask::new(&mut modules, &mutators)],
        )
        .discard(points.iter_mut().collect())
        .unwrap();

        assert!(points[0].is_applied());
        let mutant = modules[0]
            .function("sub.mutant.cxx_sub_to_add.0_0")
            .unwrap();
        assert!(matches!(
            mutant.blocks[0].instructions[0].kind,
            InstructionKind::Binary { op: BinaryOp::Add, .. }
        ));
        let original = modules[0].function("sub.original").unwrap();
        assert!(matches!(
            original.blocks[0].instructions[0].kind,
            InstructionKind::Binary { op: BinaryOp::Sub, .. }
        ));
    }

    #[test]
    fn test_apply_without_enabled_mutator_fails() {
        let diagnostics = Diagnostics::capturing();
        let (module, point) = module_with_mutation();
        let mut modules = vec![module];
        synthesize(&diagnostics, &mut modules);

        let mutators = mutators_from_ids(&["cxx_add_to_sub".to_string()]).unwrap();
        let mut points = vec![point];
        let result = TaskExecutor::new(
            &diagnostics,
            "Applying mutations",
            vec![ApplyMutationTask::new(&mut modules, &mutators)],
        )
        .discard(points.iter_mut().collect());

        assert!(matches!(result, Err(MutationError::FailedToApply { .. })));
        assert!(!points[0].is_applied());
    }
}
