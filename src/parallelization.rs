//! Worker-pool framework shared by every pipeline stage
//!
//! A [`TaskExecutor`] splits its input into contiguous shards, one per task
//! instance, and runs every shard on its own OS thread. Shard outputs are
//! appended to the result in shard order, so a task that keeps the relative
//! order of its own items keeps the global order too.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use crate::diagnostics::Diagnostics;
use crate::error::{MutationError, Result};

/// Items processed so far by all workers of one stage
#[derive(Debug, Default)]
pub struct ProgressCounter {
    done: AtomicUsize,
}

impl ProgressCounter {
    pub fn increment(&self) {
        self.done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }
}

/// One worker-local unit of a pipeline stage
///
/// A task owns whatever per-worker state it needs. Returning an error aborts
/// the rest of the shard and fails the whole stage.
pub trait Task: Send {
    type In: Send;
    type Out: Send;

    fn run(
        &mut self,
        items: Vec<Self::In>,
        storage: &mut Vec<Self::Out>,
        counter: &ProgressCounter,
    ) -> Result<()>;
}

pub struct TaskExecutor<'d, T: Task> {
    diagnostics: &'d Diagnostics,
    name: String,
    tasks: Vec<T>,
}

impl<'d, T: Task> TaskExecutor<'d, T> {
    pub fn new(diagnostics: &'d Diagnostics, name: impl Into<String>, tasks: Vec<T>) -> Self {
        Self {
            diagnostics,
            name: name.into(),
            tasks,
        }
    }

    /// Run the stage and return all outputs
    pub fn collect(self, input: Vec<T::In>) -> Result<Vec<T::Out>> {
        let mut storage = Vec::new();
        self.execute(input, Some(&mut storage))?;
        Ok(storage)
    }

    /// Run the stage for its side effects only
    pub fn discard(self, input: Vec<T::In>) -> Result<()> {
        self.execute(input, None)
    }

    /// Run the stage, appending outputs to `sink` when one is given
    pub fn execute(self, input: Vec<T::In>, sink: Option<&mut Vec<T::Out>>) -> Result<()> {
        if self.tasks.is_empty() {
            return Err(MutationError::TaskFailed {
                stage: self.name,
                error: "no task instances".to_string(),
            });
        }

        let total = input.len();
        let workers = self.tasks.len().min(total).max(1);
        self.diagnostics
            .info(format!("{} (threads: {})", self.name, workers));
        let start = Instant::now();

        let counter = ProgressCounter::default();
        let shards = partition(input, workers);
        let mut tasks = self.tasks;
        tasks.truncate(workers);

        let outcomes: Vec<(Result<()>, Vec<T::Out>)> = if workers == 1 {
            let mut storage = Vec::new();
            let mut task = tasks.remove(0);
            let shard = shards.into_iter().next().unwrap_or_default();
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                task.run(shard, &mut storage, &counter)
            }))
            .unwrap_or_else(|_| Err(worker_panicked(&self.name)));
            vec![(result, storage)]
        } else {
            let name = &self.name;
            let counter = &counter;
            thread::scope(|scope| {
                let handles: Vec<_> = tasks
                    .into_iter()
                    .zip(shards)
                    .map(|(mut task, shard)| {
                        scope.spawn(move || {
                            let mut storage = Vec::new();
                            let result = task.run(shard, &mut storage, counter);
                            (result, storage)
                        })
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|handle| {
                        handle
                            .join()
                            .unwrap_or_else(|_| (Err(worker_panicked(name)), Vec::new()))
                    })
                    .collect()
            })
        };

        let mut outputs = Vec::new();
        for (result, storage) in outcomes {
            result?;
            outputs.push(storage);
        }
        if let Some(sink) = sink {
            for storage in outputs {
                sink.extend(storage);
            }
        }

        self.diagnostics.debug(format!(
            "{}: processed {}/{} items",
            self.name,
            counter.done(),
            total
        ));
        self.diagnostics.info(format!(
            "{}: finished in {}ms",
            self.name,
            start.elapsed().as_millis()
        ));
        Ok(())
    }
}

fn worker_panicked(stage: &str) -> MutationError {
    MutationError::TaskFailed {
        stage: stage.to_string(),
        error: "worker thread panicked".to_string(),
    }
}

/// Split `input` into `count` contiguous shards whose sizes differ by at most one
fn partition<I>(input: Vec<I>, count: usize) -> Vec<Vec<I>> {
    let total = input.len();
    let base = total / count;
    let remainder = total % count;

    let mut items = input.into_iter();
    (0..count)
        .map(|i| {
            let len = base + usize::from(i < remainder);
            items.by_ref().take(len).collect()
        })
        .collect()
}

/// Runs a closure as a single-threaded stage with the usual progress banners
pub struct SingleTask<'d> {
    diagnostics: &'d Diagnostics,
}

impl<'d> SingleTask<'d> {
    pub fn new(diagnostics: &'d Diagnostics) -> Self {
        Self { diagnostics }
    }

    pub fn execute<R>(&self, name: &str, job: impl FnOnce() -> R) -> R {
        self.diagnostics.info(format!("{} (threads: 1)", name));
        let start = Instant::now();
        let result = job();
        self.diagnostics.info(format!(
            "{}: finished in {}ms",
            name,
            start.elapsed().as_millis()
        ));
        result
    }
}
