//! The mutation testing pipeline, stage by stage
//!
//! Stages run strictly one after another; parallelism only exists inside a
//! stage. A run finds tests, checks the baseline, discovers and filters
//! mutation points, builds every mutant into one executable and finally runs
//! that executable once per mutant.

use std::path::PathBuf;

use crate::config::Configuration;
use crate::coverage::{CoverageLoader, CoveredFunctions, JsonCoverageLoader};
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::execution::{
    DryRunMutantExecutionTask, ExecutionResult, ExecutionStatus, MutantExecutionTask, Runner,
};
use crate::filters::{Filters, FunctionFilterTask, InstructionSelectionTask, MutationFilterTask};
use crate::finder::MutationsFinder;
use crate::mutation::{FunctionUnderTest, MutationPoint};
use crate::mutator::Mutator;
use crate::parallelization::{SingleTask, TaskExecutor};
use crate::program::Program;
use crate::result::{MutationResult, RunResult};
use crate::sandbox::ProcessSandbox;
use crate::synthesis::{
    ApplyMutationTask, CloneMutatedFunctionsTask, DeleteOriginalFunctionsTask,
    InsertMutationTrampolinesTask,
};
use crate::test_framework::{MainTestFinder, Test, TestFinder};
use crate::toolchain::{OriginalCompilationTask, Toolchain};

pub struct Driver<'a> {
    diagnostics: &'a Diagnostics,
    config: &'a Configuration,
    sandbox: &'a dyn ProcessSandbox,
    program: &'a mut Program,
    toolchain: &'a Toolchain,
    filters: &'a Filters,
    mutators: &'a [Box<dyn Mutator>],
    test_finder: &'a dyn TestFinder,
    coverage_loader: &'a dyn CoverageLoader,
    single_task: SingleTask<'a>,
}

impl<'a> Driver<'a> {
    pub fn new(
        diagnostics: &'a Diagnostics,
        config: &'a Configuration,
        sandbox: &'a dyn ProcessSandbox,
        program: &'a mut Program,
        toolchain: &'a Toolchain,
        filters: &'a Filters,
        mutators: &'a [Box<dyn Mutator>],
    ) -> Self {
        Self {
            diagnostics,
            config,
            sandbox,
            program,
            toolchain,
            filters,
            mutators,
            test_finder: &MainTestFinder,
            coverage_loader: &JsonCoverageLoader,
            single_task: SingleTask::new(diagnostics),
        }
    }

    pub fn with_test_finder(mut self, test_finder: &'a dyn TestFinder) -> Self {
        self.test_finder = test_finder;
        self
    }

    pub fn with_coverage_loader(mut self, coverage_loader: &'a dyn CoverageLoader) -> Self {
        self.coverage_loader = coverage_loader;
        self
    }

    pub fn run(&mut self) -> Result<RunResult> {
        let mut tests = self.find_tests();
        if tests.is_empty() {
            self.diagnostics.warning(
                "No tests found. Make sure the program defines an entry point for its test suite.",
            );
        }
        let points = self.find_mutation_points(&mut tests)?;
        let points = self.filter_mutations(points)?;
        let (results, points) = self.run_mutations(points)?;
        Ok(RunResult::new(tests, results, points))
    }

    fn workers(&self) -> usize {
        self.config.workers.max(1)
    }

    fn find_tests(&self) -> Vec<Test> {
        let program: &Program = self.program;
        self.single_task
            .execute("Searching tests", || self.test_finder.find_tests(program))
    }

    fn find_mutation_points(&self, tests: &mut [Test]) -> Result<Vec<MutationPoint>> {
        if tests.is_empty() {
            return Ok(Vec::new());
        }

        self.sanity_check(tests)?;

        let functions = self.functions_under_test(tests.len());
        let mut functions = self.filter_functions(functions)?;
        self.select_instructions(&mut functions)?;

        MutationsFinder::new(self.mutators).find_mutation_points(
            self.diagnostics,
            self.program,
            &functions,
            self.workers(),
        )
    }

    fn sanity_check(&self, tests: &mut [Test]) -> Result<()> {
        if self.config.skip_sanity_check {
            for test in tests.iter_mut() {
                test.set_execution_result(ExecutionResult::assumed_pass(self.config.timeout()));
            }
            return Ok(());
        }

        let runner = Runner::new(self.diagnostics, self.sandbox);
        let result = self.single_task.execute("Sanity check run", || {
            runner.run_program(
                &self.config.executable,
                &[],
                &[],
                self.config.timeout(),
                self.config.capture_test_output,
            )
        })?;

        for test in tests.iter() {
            if result.status != ExecutionStatus::Passed {
                self.diagnostics.warning(format!(
                    "Original test failed\ntest: {}\nstatus: {}\nstdout: '{}'\nstderr: '{}'",
                    test.name,
                    result.status.as_str(),
                    result.stdout,
                    result.stderr
                ));
            }
        }
        for test in tests.iter_mut() {
            test.set_execution_result(result.clone());
        }
        Ok(())
    }

    fn load_coverage(&self) -> Option<CoveredFunctions> {
        let coverage_info = self.config.coverage_info.as_ref()?;
        match self
            .coverage_loader
            .load(&self.config.executable, coverage_info)
        {
            Ok(coverage) => Some(coverage.executed_functions()),
            Err(e) => {
                self.diagnostics.warning(e.to_string());
                None
            }
        }
    }

    /// Every test paired with every covered function, or with every function
    /// when there is no usable coverage
    fn functions_under_test(&self, test_count: usize) -> Vec<FunctionUnderTest> {
        self.single_task
            .execute("Gathering functions under test", || {
                let coverage = self.load_coverage();
                let mut functions = Vec::new();
                for test in 0..test_count {
                    for (function, module, definition) in self.program.defined_functions() {
                        let covered = coverage.as_ref().map_or(true, |covered| {
                            covered.contains(&definition.name, module.unit_file_name())
                        });
                        if covered {
                            functions.push(FunctionUnderTest::new(function, test));
                        }
                    }
                }
                functions
            })
    }

    fn filter_functions(
        &self,
        mut functions: Vec<FunctionUnderTest>,
    ) -> Result<Vec<FunctionUnderTest>> {
        let program: &Program = self.program;
        for filter in &self.filters.function_filters {
            let tasks = (0..self.workers())
                .map(|_| FunctionFilterTask::new(program, filter.as_ref()))
                .collect();
            let label = format!("Applying function filter: {}", filter.name());
            functions = TaskExecutor::new(self.diagnostics, label, tasks).collect(functions)?;
        }
        Ok(functions)
    }

    fn select_instructions(&self, functions: &mut [FunctionUnderTest]) -> Result<()> {
        let program: &Program = self.program;
        let tasks = (0..self.workers())
            .map(|_| InstructionSelectionTask::new(program, &self.filters.instruction_filters))
            .collect();
        TaskExecutor::new(self.diagnostics, "Instruction selection", tasks)
            .discard(functions.iter_mut().collect())
    }

    fn filter_mutations(&self, mut points: Vec<MutationPoint>) -> Result<Vec<MutationPoint>> {
        for filter in &self.filters.mutation_filters {
            let tasks = (0..self.workers())
                .map(|_| MutationFilterTask::new(filter.as_ref()))
                .collect();
            let label = format!("Applying filter: {}", filter.name());
            points = TaskExecutor::new(self.diagnostics, label, tasks).collect(points)?;
        }
        Ok(points)
    }

    fn run_mutations(
        &mut self,
        points: Vec<MutationPoint>,
    ) -> Result<(Vec<MutationResult>, Vec<MutationPoint>)> {
        if points.is_empty() {
            return Ok((Vec::new(), points));
        }
        if self.config.dry_run {
            let results = self.dry_run_mutations(&points)?;
            return Ok((results, points));
        }
        self.normal_run_mutations(points)
    }

    fn dry_run_mutations(&self, points: &[MutationPoint]) -> Result<Vec<MutationResult>> {
        let tasks = (0..self.workers())
            .map(|_| DryRunMutantExecutionTask::new(self.diagnostics))
            .collect();
        TaskExecutor::new(self.diagnostics, "Running mutants (dry run)", tasks)
            .collect(points.iter().collect())
    }

    fn normal_run_mutations(
        &mut self,
        mut points: Vec<MutationPoint>,
    ) -> Result<(Vec<MutationResult>, Vec<MutationPoint>)> {
        let diagnostics = self.diagnostics;
        let workers = self.workers();

        self.single_task.execute("Prepare mutations", || {
            let modules = self.program.modules_mut();
            for point in &points {
                if let Some(module) = modules.get_mut(point.function.module) {
                    module.add_mutation(point.clone());
                }
            }
        });

        let tasks = (0..workers)
            .map(|_| CloneMutatedFunctionsTask::new(diagnostics))
            .collect();
        TaskExecutor::new(diagnostics, "Cloning functions for mutation", tasks)
            .discard(self.program.modules_mut().iter_mut().collect())?;

        let tasks = (0..workers)
            .map(|_| DeleteOriginalFunctionsTask::new(diagnostics))
            .collect();
        TaskExecutor::new(diagnostics, "Removing original functions", tasks)
            .discard(self.program.modules_mut().iter_mut().collect())?;

        let tasks = (0..workers)
            .map(|_| InsertMutationTrampolinesTask::new(diagnostics))
            .collect();
        TaskExecutor::new(diagnostics, "Redirect mutated functions", tasks)
            .discard(self.program.modules_mut().iter_mut().collect())?;

        let apply = ApplyMutationTask::new(self.program.modules_mut(), self.mutators);
        TaskExecutor::new(diagnostics, "Applying mutations", vec![apply])
            .discard(points.iter_mut().collect())?;

        let toolchain = self.toolchain;
        let tasks = (0..workers)
            .map(|_| OriginalCompilationTask::new(toolchain))
            .collect();
        let mut objects: Vec<PathBuf> =
            TaskExecutor::new(diagnostics, "Compiling original code", tasks)
                .collect(self.program.modules().iter().collect())?;

        let program: &Program = self.program;
        let libraries = self
            .single_task
            .execute("Loading dynamic libraries", || {
                program
                    .load_dynamic_libraries(diagnostics)
                    .iter()
                    .map(|library| toolchain.compiler().compile_library(library))
                    .collect::<Result<Vec<_>>>()
            })?;
        objects.extend(libraries);
        objects.extend(program.precompiled_objects().iter().cloned());

        let output_name = self.mutated_executable_name();
        let executable = self.single_task.execute("Link mutated program", || {
            toolchain.linker().link(&objects, &output_name)
        })?;

        let runner_workers = self.config.mutant_execution_workers().max(1);
        let timeout = self.config.timeout();
        let capture = self.config.capture_mutant_output;
        let tasks = (0..runner_workers)
            .map(|_| {
                MutantExecutionTask::new(
                    Runner::new(diagnostics, self.sandbox),
                    &executable,
                    timeout,
                    capture,
                )
            })
            .collect();
        let results = TaskExecutor::new(diagnostics, "Running mutants", tasks)
            .collect(points.iter().collect())?;

        Ok((results, points))
    }

    fn mutated_executable_name(&self) -> String {
        let stem = self
            .config
            .executable
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("program");
        format!("{}-mutated", stem)
    }
}
