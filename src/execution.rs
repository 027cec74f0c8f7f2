//! Timeout-bounded execution of the program and its mutants
//!
//! Every mutant runs as a separate child process. The selector environment
//! variable of its mutation point is the only difference between two runs,
//! and exactly one selector is set per run.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::diagnostics::Diagnostics;
use crate::error::{MutationError, Result};
use crate::mutation::MutationPoint;
use crate::parallelization::{ProgressCounter, Task};
use crate::result::MutationResult;
use crate::sandbox::ProcessSandbox;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Exit code 0
    Passed,
    /// Normal exit with a nonzero code
    Failed,
    /// Terminated abnormally, e.g. by a signal
    Crashed,
    /// Killed after exceeding the timeout
    Timedout,
    /// Not executed at all
    DryRun,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Passed => "Passed",
            ExecutionStatus::Failed => "Failed",
            ExecutionStatus::Crashed => "Crashed",
            ExecutionStatus::Timedout => "Timedout",
            ExecutionStatus::DryRun => "DryRun",
        }
    }
}

/// Outcome of one process execution
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub exit_code: Option<i32>,
    pub running_time: Duration,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionResult {
    /// Placeholder recorded for every mutant of a dry run
    pub fn dry_run() -> Self {
        Self {
            status: ExecutionStatus::DryRun,
            exit_code: None,
            running_time: Duration::ZERO,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Result assumed for the baseline when the sanity check is skipped
    pub fn assumed_pass(timeout: Duration) -> Self {
        Self {
            status: ExecutionStatus::Passed,
            exit_code: Some(0),
            running_time: timeout,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

/// Launches processes inside a sandbox and classifies how they end
pub struct Runner<'a> {
    diagnostics: &'a Diagnostics,
    sandbox: &'a dyn ProcessSandbox,
}

impl<'a> Runner<'a> {
    pub fn new(diagnostics: &'a Diagnostics, sandbox: &'a dyn ProcessSandbox) -> Self {
        Self {
            diagnostics,
            sandbox,
        }
    }

    /// Run `program` and block until it exits or `timeout` elapses
    ///
    /// Failing to start the process is an error; every way the process itself
    /// can end is reported through the returned result.
    pub fn run_program(
        &self,
        program: &Path,
        args: &[String],
        env: &[(String, String)],
        timeout: Duration,
        capture_output: bool,
    ) -> Result<ExecutionResult> {
        let mut command = Command::new(program);
        command.args(args).stdin(Stdio::null());
        self.sandbox.prepare(&mut command)?;
        for (key, value) in env {
            command.env(key, value);
        }
        if capture_output {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let start = Instant::now();
        let mut child = command.spawn().map_err(|e| process_error(program, e))?;
        let stdout_reader = child.stdout.take().map(spawn_reader);
        let stderr_reader = child.stderr.take().map(spawn_reader);

        let exit = wait_with_timeout(&mut child, start, timeout).map_err(|e| process_error(program, e))?;
        let running_time = start.elapsed();

        let (status, exit_code) = match exit {
            Some(exit_status) => classify(exit_status),
            None => {
                self.diagnostics.debug(format!(
                    "{} timed out after {}ms",
                    program.display(),
                    running_time.as_millis()
                ));
                (ExecutionStatus::Timedout, None)
            }
        };

        Ok(ExecutionResult {
            status,
            exit_code,
            running_time,
            stdout: join_reader(stdout_reader),
            stderr: join_reader(stderr_reader),
        })
    }
}

/// `None` means the child was killed for exceeding `timeout`
fn wait_with_timeout(
    child: &mut Child,
    start: Instant,
    timeout: Duration,
) -> std::io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn classify(status: ExitStatus) -> (ExecutionStatus, Option<i32>) {
    match status.code() {
        Some(0) => (ExecutionStatus::Passed, Some(0)),
        Some(code) => (ExecutionStatus::Failed, Some(code)),
        None => (ExecutionStatus::Crashed, None),
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut stream: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = stream.read_to_end(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

fn join_reader(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn process_error(program: &Path, error: std::io::Error) -> MutationError {
    MutationError::ProcessError {
        program: program.to_path_buf(),
        error: error.to_string(),
    }
}

/// Runs the linked executable once per mutation point
pub struct MutantExecutionTask<'a> {
    runner: Runner<'a>,
    executable: PathBuf,
    timeout: Duration,
    capture_output: bool,
}

impl<'a> MutantExecutionTask<'a> {
    pub fn new(
        runner: Runner<'a>,
        executable: impl Into<PathBuf>,
        timeout: Duration,
        capture_output: bool,
    ) -> Self {
        Self {
            runner,
            executable: executable.into(),
            timeout,
            capture_output,
        }
    }
}

impl<'a> Task for MutantExecutionTask<'a> {
    type In = &'a MutationPoint;
    type Out = MutationResult;

    fn run(
        &mut self,
        items: Vec<&'a MutationPoint>,
        storage: &mut Vec<MutationResult>,
        counter: &ProgressCounter,
    ) -> Result<()> {
        for point in items {
            if !point.is_applied() {
                return Err(MutationError::TaskFailed {
                    stage: "mutant execution".to_string(),
                    error: format!("mutation '{}' was never applied", point.user_identifier()),
                });
            }
            let env = vec![(point.selector(), "1".to_string())];
            let result = self.runner.run_program(
                &self.executable,
                &[],
                &env,
                self.timeout,
                self.capture_output,
            )?;
            storage.push(MutationResult::new(point.clone(), result));
            counter.increment();
        }
        Ok(())
    }
}

/// Records a placeholder result per point without launching anything
pub struct DryRunMutantExecutionTask<'a> {
    diagnostics: &'a Diagnostics,
}

impl<'a> DryRunMutantExecutionTask<'a> {
    pub fn new(diagnostics: &'a Diagnostics) -> Self {
        Self { diagnostics }
    }
}

impl<'a> Task for DryRunMutantExecutionTask<'a> {
    type In = &'a MutationPoint;
    type Out = MutationResult;

    fn run(
        &mut self,
        items: Vec<&'a MutationPoint>,
        storage: &mut Vec<MutationResult>,
        counter: &ProgressCounter,
    ) -> Result<()> {
        for point in items {
            self.diagnostics.debug(format!("Dry run: {}", point));
            storage.push(MutationResult::new(point.clone(), ExecutionResult::dry_run()));
            counter.increment();
        }
        Ok(())
    }
}
