//! Per-mutant outcomes and the aggregate of a whole run

use crate::execution::{ExecutionResult, ExecutionStatus};
use crate::mutation::MutationPoint;
use crate::test_framework::Test;

/// Whether the test suite noticed a mutant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Killed,
    Survived,
    /// Dry run, nothing was executed
    NotExecuted,
}

/// One mutation point bound to the outcome of running its mutant
#[derive(Debug, Clone, PartialEq)]
pub struct MutationResult {
    pub point: MutationPoint,
    pub execution: ExecutionResult,
}

impl MutationResult {
    pub fn new(point: MutationPoint, execution: ExecutionResult) -> Self {
        Self { point, execution }
    }

    /// A mutant is killed when its run did not pass
    pub fn verdict(&self) -> Verdict {
        match self.execution.status {
            ExecutionStatus::Passed => Verdict::Survived,
            ExecutionStatus::DryRun => Verdict::NotExecuted,
            ExecutionStatus::Failed | ExecutionStatus::Crashed | ExecutionStatus::Timedout => {
                Verdict::Killed
            }
        }
    }
}

/// Everything a run produced; nothing changes after construction
#[derive(Debug)]
pub struct RunResult {
    tests: Vec<Test>,
    mutation_results: Vec<MutationResult>,
    mutation_points: Vec<MutationPoint>,
}

impl RunResult {
    pub fn new(
        tests: Vec<Test>,
        mutation_results: Vec<MutationResult>,
        mutation_points: Vec<MutationPoint>,
    ) -> Self {
        Self {
            tests,
            mutation_results,
            mutation_points,
        }
    }

    pub fn tests(&self) -> &[Test] {
        &self.tests
    }

    pub fn mutation_results(&self) -> &[MutationResult] {
        &self.mutation_results
    }

    /// Mutation points that survived every filter
    pub fn mutation_points(&self) -> &[MutationPoint] {
        &self.mutation_points
    }

    pub fn count(&self, verdict: Verdict) -> usize {
        self.mutation_results
            .iter()
            .filter(|r| r.verdict() == verdict)
            .count()
    }

    pub fn count_status(&self, status: ExecutionStatus) -> usize {
        self.mutation_results
            .iter()
            .filter(|r| r.execution.status == status)
            .count()
    }

    /// Percentage of executed mutants that were killed
    pub fn score(&self) -> f64 {
        let killed = self.count(Verdict::Killed);
        let executed = killed + self.count(Verdict::Survived);
        if executed == 0 {
            return 100.0;
        }
        (killed as f64 / executed as f64) * 100.0
    }

    pub fn survivors(&self) -> impl Iterator<Item = &MutationResult> {
        self.mutation_results
            .iter()
            .filter(|r| r.verdict() == Verdict::Survived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::InstructionAddress;
    use crate::mutation::FunctionRef;
    use std::time::Duration;

    fn result(status: ExecutionStatus) -> MutationResult {
        let point = MutationPoint::new(
            "cxx_sub_to_add",
            FunctionRef {
                module: 0,
                name: "sub".to_string(),
            },
            InstructionAddress { block: 0, index: 0 },
            None,
            "Replaced - with +",
        );
        MutationResult::new(
            point,
            ExecutionResult {
                status,
                exit_code: None,
                running_time: Duration::from_millis(5),
                stdout: String::new(),
                stderr: String::new(),
            },
        )
    }

    #[test]
    fn test_verdicts() {
        assert_eq!(result(ExecutionStatus::Passed).verdict(), Verdict::Survived);
        assert_eq!(result(ExecutionStatus::Failed).verdict(), Verdict::Killed);
        assert_eq!(result(ExecutionStatus::Crashed).verdict(), Verdict::Killed);
        assert_eq!(result(ExecutionStatus::Timedout).verdict(), Verdict::Killed);
        assert_eq!(result(ExecutionStatus::DryRun).verdict(), Verdict::NotExecuted);
    }

    #[test]
    fn test_score_ignores_dry_runs() {
        let run = RunResult::new(
            Vec::new(),
            vec![
                result(ExecutionStatus::Failed),
                result(ExecutionStatus::Passed),
                result(ExecutionStatus::Timedout),
                result(ExecutionStatus::DryRun),
            ],
            Vec::new(),
        );
        assert_eq!(run.count(Verdict::Killed), 2);
        assert_eq!(run.survivors().count(), 1);
        assert!((run.score() - 66.666).abs() < 0.01);
    }

    #[test]
    fn test_empty_run_scores_full() {
        let run = RunResult::new(Vec::new(), Vec::new(), Vec::new());
        assert_eq!(run.score(), 100.0);
    }
}
