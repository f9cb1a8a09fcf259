//! Fan-out of compile tasks over a fixed worker pool.
//!
//! Workers never share outcome state. Each one sends `(source, outcome)`
//! down a channel and the calling thread is the single aggregator, waiting
//! under one overall deadline.
//!
//! When that deadline fires the build is aborted: tasks that have not started
//! yet are skipped, but compilers that are already running are left alone
//! and only stop when their own watchdog fires.

use super::process::{CompileTask, TaskRunner};
use super::report::{BuildReport, TaskFailure, TaskOutcome};
use crate::error::BuildError;
use indicatif::ProgressBar;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(10 * 60);

pub struct Scheduler {
    jobs: usize,
    build_timeout: Duration,
    progress: Option<ProgressBar>,
}

impl Scheduler {
    pub fn new(jobs: usize, build_timeout: Duration) -> Self {
        Self {
            jobs: jobs.max(1),
            build_timeout,
            progress: None,
        }
    }

    /// Ticks `bar` once per finished task. Task logs are printed around it.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Runs every task and returns once all of them reported.
    ///
    /// Per-task failures end up in the report. Only pool creation and the
    /// overall deadline produce an `Err`.
    pub fn run<R>(&self, tasks: Vec<CompileTask>, runner: Arc<R>) -> Result<BuildReport, BuildError>
    where
        R: TaskRunner + 'static,
    {
        if tasks.is_empty() {
            return Ok(BuildReport::new());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .thread_name(|i| format!("cux-worker-{i}"))
            .panic_handler(|_| error!("A compile worker panicked"))
            .build()?;

        let (tx, rx) = mpsc::channel::<(PathBuf, TaskOutcome)>();
        let aborted = Arc::new(AtomicBool::new(false));
        let mut pending: BTreeSet<PathBuf> = BTreeSet::new();

        debug!("Dispatching {} task(s) over {} worker(s)", tasks.len(), self.jobs);

        for task in tasks {
            pending.insert(task.unit.source.clone());
            let tx = tx.clone();
            let runner = Arc::clone(&runner);
            let aborted = Arc::clone(&aborted);
            let progress = self.progress.clone();

            pool.spawn(move || {
                if aborted.load(Ordering::Acquire) {
                    debug!("Skipping {} (build aborted)", task.unit.source.display());
                    return;
                }
                let outcome = runner.run(&task);
                emit(&outcome, progress.as_ref());
                // The receiver is gone once the build was aborted
                let _ = tx.send((task.unit.source, outcome));
            });
        }
        drop(tx);

        // `None` when the timeout is too large to represent: wait without a deadline
        let deadline = Instant::now().checked_add(self.build_timeout);
        let mut report = BuildReport::new();

        while !pending.is_empty() {
            let received = match deadline {
                Some(deadline) => rx.recv_timeout(deadline.saturating_duration_since(Instant::now())),
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok((source, outcome)) => {
                    pending.remove(&source);
                    report.record(source, outcome);
                }
                Err(RecvTimeoutError::Timeout) => {
                    aborted.store(true, Ordering::Release);
                    return Err(BuildError::BuildTimeout {
                        timeout: self.build_timeout,
                        outstanding: pending.len(),
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    // Every sender is gone but some tasks never reported: their worker panicked
                    for source in std::mem::take(&mut pending) {
                        let outcome = TaskOutcome::failure(
                            TaskFailure::Execution {
                                message: "worker exited without reporting".to_string(),
                            },
                            format!("Compiling {} aborted: worker panicked", source.display()),
                        );
                        emit(&outcome, self.progress.as_ref());
                        report.record(source, outcome);
                    }
                }
            }
        }

        Ok(report)
    }
}

fn emit(outcome: &TaskOutcome, progress: Option<&ProgressBar>) {
    let log = || {
        if outcome.is_failure() {
            error!("{}", outcome.log);
        } else {
            info!("{}", outcome.log);
        }
    };
    match progress {
        Some(bar) => {
            bar.suspend(log);
            bar.inc(1);
        }
        None => log(),
    }
}
