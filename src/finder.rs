//! Mutation point discovery over the functions under test

use std::collections::HashMap;

use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::mutation::{FunctionUnderTest, MutationPoint};
use crate::mutator::Mutator;
use crate::parallelization::{ProgressCounter, Task, TaskExecutor};
use crate::program::Program;

/// Asks every mutator for the points of one function at a time
pub struct SearchMutationPointsTask<'a> {
    program: &'a Program,
    mutators: &'a [Box<dyn Mutator>],
}

impl<'a> SearchMutationPointsTask<'a> {
    pub fn new(program: &'a Program, mutators: &'a [Box<dyn Mutator>]) -> Self {
        Self { program, mutators }
    }
}

impl<'a> Task for SearchMutationPointsTask<'a> {
    type In = &'a FunctionUnderTest;
    type Out = MutationPoint;

    fn run(
        &mut self,
        items: Vec<&'a FunctionUnderTest>,
        storage: &mut Vec<MutationPoint>,
        counter: &ProgressCounter,
    ) -> Result<()> {
        for candidate in items {
            counter.increment();
            let Some(function) = self.program.function(&candidate.function) else {
                continue;
            };
            for mutator in self.mutators {
                for mut point in mutator.find_mutation_points(candidate, function) {
                    point.tests.push(candidate.test);
                    storage.push(point);
                }
            }
        }
        Ok(())
    }
}

pub struct MutationsFinder<'a> {
    mutators: &'a [Box<dyn Mutator>],
}

impl<'a> MutationsFinder<'a> {
    pub fn new(mutators: &'a [Box<dyn Mutator>]) -> Self {
        Self { mutators }
    }

    /// Points of every function, one per location and mutator
    ///
    /// A function reached by several tests yields the same point once per
    /// test; those copies are merged, keeping the first one's position.
    pub fn find_mutation_points(
        &self,
        diagnostics: &Diagnostics,
        program: &Program,
        functions: &[FunctionUnderTest],
        workers: usize,
    ) -> Result<Vec<MutationPoint>> {
        let tasks = (0..workers)
            .map(|_| SearchMutationPointsTask::new(program, self.mutators))
            .collect();
        let points = TaskExecutor::new(diagnostics, "Searching mutants", tasks)
            .collect(functions.iter().collect())?;
        Ok(merge_duplicates(points))
    }
}

fn merge_duplicates(points: Vec<MutationPoint>) -> Vec<MutationPoint> {
    let mut merged: Vec<MutationPoint> = Vec::with_capacity(points.len());
    let mut positions: HashMap<String, usize> = HashMap::new();
    for point in points {
        match positions.get(&point.identifier()) {
            Some(&position) => {
                let tests = &mut merged[position].tests;
                for test in point.tests {
                    if !tests.contains(&test) {
                        tests.push(test);
                    }
                }
            }
            None => {
                positions.insert(point.identifier(), merged.len());
                merged.push(point);
            }
        }
    }
    merged
}
