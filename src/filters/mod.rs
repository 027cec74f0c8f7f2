//! Filters narrowing the working set of each discovery stage
//!
//! A filter implements one trait per capability it supports: filtering
//! mutation points, functions, or individual instructions. Filter instances are
//! shared by every worker of a stage, so they only take `&self`.

mod file_path;
mod no_debug_info;

pub use file_path::FilePathFilter;
pub use no_debug_info::NoDebugInfoFilter;

use std::sync::Arc;

use crate::error::Result;
use crate::ir::{Function, Instruction};
use crate::mutation::{FunctionUnderTest, MutationPoint};
use crate::parallelization::{ProgressCounter, Task};
use crate::program::Program;

pub trait MutationFilter: Send + Sync {
    fn name(&self) -> &str;
    fn should_skip(&self, point: &MutationPoint) -> bool;
}

pub trait FunctionFilter: Send + Sync {
    fn name(&self) -> &str;
    fn should_skip(&self, function: &Function) -> bool;
}

pub trait InstructionFilter: Send + Sync {
    fn name(&self) -> &str;
    fn should_skip(&self, instruction: &Instruction) -> bool;
}

/// Ordered filter chains, one per capability
#[derive(Clone, Default)]
pub struct Filters {
    pub mutation_filters: Vec<Arc<dyn MutationFilter>>,
    pub function_filters: Vec<Arc<dyn FunctionFilter>>,
    pub instruction_filters: Vec<Arc<dyn InstructionFilter>>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a filter for all three capabilities
    pub fn add_all<F>(&mut self, filter: F)
    where
        F: MutationFilter + FunctionFilter + InstructionFilter + 'static,
    {
        let filter = Arc::new(filter);
        self.mutation_filters.push(filter.clone());
        self.function_filters.push(filter.clone());
        self.instruction_filters.push(filter);
    }
}

/// Keeps the mutation points a filter doesn't skip
pub struct MutationFilterTask<'a> {
    filter: &'a dyn MutationFilter,
}

impl<'a> MutationFilterTask<'a> {
    pub fn new(filter: &'a dyn MutationFilter) -> Self {
        Self { filter }
    }
}

impl Task for MutationFilterTask<'_> {
    type In = MutationPoint;
    type Out = MutationPoint;

    fn run(
        &mut self,
        items: Vec<MutationPoint>,
        storage: &mut Vec<MutationPoint>,
        counter: &ProgressCounter,
    ) -> Result<()> {
        for point in items {
            counter.increment();
            if !self.filter.should_skip(&point) {
                storage.push(point);
            }
        }
        Ok(())
    }
}

/// Keeps the functions under test a filter doesn't skip
pub struct FunctionFilterTask<'a> {
    program: &'a Program,
    filter: &'a dyn FunctionFilter,
}

impl<'a> FunctionFilterTask<'a> {
    pub fn new(program: &'a Program, filter: &'a dyn FunctionFilter) -> Self {
        Self { program, filter }
    }
}

impl Task for FunctionFilterTask<'_> {
    type In = FunctionUnderTest;
    type Out = FunctionUnderTest;

    fn run(
        &mut self,
        items: Vec<FunctionUnderTest>,
        storage: &mut Vec<FunctionUnderTest>,
        counter: &ProgressCounter,
    ) -> Result<()> {
        for candidate in items {
            counter.increment();
            let keep = match self.program.function(&candidate.function) {
                Some(function) => !self.filter.should_skip(function),
                None => false,
            };
            if keep {
                storage.push(candidate);
            }
        }
        Ok(())
    }
}

/// Marks the instructions of each function that every filter accepts
pub struct InstructionSelectionTask<'a> {
    program: &'a Program,
    filters: &'a [Arc<dyn InstructionFilter>],
}

impl<'a> InstructionSelectionTask<'a> {
    pub fn new(program: &'a Program, filters: &'a [Arc<dyn InstructionFilter>]) -> Self {
        Self { program, filters }
    }
}

impl<'a> Task for InstructionSelectionTask<'a> {
    type In = &'a mut FunctionUnderTest;
    type Out = ();

    fn run(
        &mut self,
        items: Vec<&'a mut FunctionUnderTest>,
        _: &mut Vec<()>,
        counter: &ProgressCounter,
    ) -> Result<()> {
        for candidate in items {
            counter.increment();
            let Some(function) = self.program.function(&candidate.function) else {
                candidate.selected_instructions.clear();
                continue;
            };
            candidate.selected_instructions = function
                .instructions()
                .filter(|(_, instruction)| {
                    !self
                        .filters
                        .iter()
                        .any(|filter| filter.should_skip(instruction))
                })
                .map(|(address, _)| address)
                .collect();
        }
        Ok(())
    }
}
