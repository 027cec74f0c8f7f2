//! Report generation for mutation testing results
//!
//! This module formats and displays a finished run.

use colored::Colorize;
use std::fmt::Write;
use std::time::Duration;

use crate::execution::ExecutionStatus;
use crate::result::{RunResult, Verdict};

/// Human-readable summary of a [`RunResult`]
#[derive(Debug)]
pub struct MutationReport<'r> {
    result: &'r RunResult,
}

impl<'r> MutationReport<'r> {
    pub fn new(result: &'r RunResult) -> Self {
        Self { result }
    }

    /// Time spent running mutants, summed over all workers
    pub fn total_duration(&self) -> Duration {
        self.result
            .mutation_results()
            .iter()
            .map(|r| r.execution.running_time)
            .sum()
    }

    /// Print the report to stdout
    pub fn print(&self) {
        print!("{}", self.render());
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) -> std::fmt::Result {
        let result = self.result;

        writeln!(out)?;
        writeln!(out, "{}", "Mutation Testing Report".bold())?;
        writeln!(out, "{}", "=".repeat(60))?;
        writeln!(out)?;

        for test in result.tests() {
            let status = test
                .execution_result
                .as_ref()
                .map_or("not run", |r| r.status.as_str());
            writeln!(out, "Test {}: {}", test.name, status.dimmed())?;
        }
        if !result.tests().is_empty() {
            writeln!(out)?;
        }

        for mutation in result.mutation_results() {
            let verdict = match mutation.verdict() {
                Verdict::Killed => "[KILLED]".green().bold(),
                Verdict::Survived => "[SURVIVED]".red().bold(),
                Verdict::NotExecuted => "[NOT RUN]".yellow().bold(),
            };
            writeln!(
                out,
                "{} {} {}",
                verdict,
                mutation.point.mutator.dimmed(),
                mutation.point.replacement
            )?;
            let location = mutation
                .point
                .location
                .as_ref()
                .map_or_else(|| mutation.point.address.to_string(), |l| l.to_string());
            writeln!(
                out,
                "        {} in function '{}' ({})",
                location.dimmed(),
                mutation.point.function.name,
                mutation.execution.status.as_str()
            )?;
        }

        writeln!(out)?;
        writeln!(out, "{}", "Summary".bold())?;
        writeln!(out, "{}", "-".repeat(40))?;
        writeln!(out, "Mutation points:   {}", result.mutation_points().len())?;
        writeln!(
            out,
            "Killed:            {} {}",
            result.count(Verdict::Killed),
            "(good - tests caught the mutation)".dimmed()
        )?;
        writeln!(
            out,
            "Survived:          {} {}",
            result.count(Verdict::Survived),
            "(bad - tests missed the mutation)".dimmed()
        )?;
        for status in [
            ExecutionStatus::Crashed,
            ExecutionStatus::Timedout,
            ExecutionStatus::DryRun,
        ] {
            let count = result.count_status(status);
            if count > 0 {
                writeln!(out, "{:<19}{}", format!("{}:", status.as_str()), count)?;
            }
        }

        if result.count(Verdict::NotExecuted) < result.mutation_results().len() {
            writeln!(out)?;
            let score = result.score();
            let score_str = format!("{:.1}%", score);
            let score_colored = if score >= 90.0 {
                score_str.green().bold()
            } else if score >= 70.0 {
                score_str.yellow().bold()
            } else {
                score_str.red().bold()
            };
            writeln!(out, "Mutation Score:    {}", score_colored)?;
            writeln!(out, "Duration:          {}", format_duration(self.total_duration()))?;
        }

        let mut survivors = result.survivors().peekable();
        if survivors.peek().is_some() {
            writeln!(out)?;
            writeln!(out, "{}", "Surviving Mutations (improve your tests!)".red().bold())?;
            writeln!(out, "{}", "-".repeat(40))?;
            for mutation in survivors {
                writeln!(out, "  • {}", mutation.point.to_string().yellow())?;
            }
        }
        Ok(())
    }
}

/// Format duration in a human-readable way
fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 1.0 {
        format!("{:.0}ms", secs * 1000.0)
    } else if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let mins = (secs / 60.0).floor();
        let remaining_secs = secs % 60.0;
        format!("{}m {:.0}s", mins, remaining_secs)
    }
}
