//! The optimization driver: the loop every worker runs.
//!
//! A worker repeatedly reserves a trial, lets the objective request
//! parameters through a [`Trial`], and finalizes the trial with the
//! outcome. Workers share nothing but the [`Study`] handle, so any number of
//! them (threads here, or processes on a shared storage file) can run
//! against one study.

use core::any::Any;
use core::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use crate::error::{Result, is_trial_pruned};
use crate::objective::Objective;
use crate::record::Outcome;
use crate::study::Study;
use crate::trial::Trial;
use crate::types::TrialState;

/// Exponential backoff for transient storage failures.
///
/// Only errors for which [`Error::is_retryable`](crate::Error::is_retryable)
/// holds are retried. The wait before retry `n` (zero-based) is
/// `base_delay * 2^n`, capped at `max_delay`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use study_coordinator::RetryPolicy;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.delay(0), Duration::from_millis(10));
/// assert_eq!(policy.delay(1), Duration::from_millis(20));
/// assert_eq!(policy.delay(30), Duration::from_secs(1));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Wait before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single wait.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// The wait before retry number `attempt`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Runs `f`, retrying retryable errors with backoff.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    pub(crate) fn run<T>(&self, operation: &'static str, mut f: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            match f() {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.delay(attempt);
                    trace_warn!(operation, attempt, error = %e, ?delay, "transient storage error, retrying");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Configuration of an optimization run.
///
/// # Examples
///
/// ```
/// use study_coordinator::{DriverConfig, RetryPolicy};
///
/// let config = DriverConfig::new(100).n_jobs(4).retry(RetryPolicy::none());
/// assert_eq!(config.n_trials, 100);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriverConfig {
    /// Total number of trials the study should hold when the run ends,
    /// counting trials that existed before it started.
    pub n_trials: usize,
    /// Number of workers. `0` means one per available CPU.
    pub n_jobs: usize,
    /// Backoff applied to transient storage failures.
    pub retry: RetryPolicy,
}

impl DriverConfig {
    /// A single-worker configuration targeting `n_trials` trials.
    #[must_use]
    pub fn new(n_trials: usize) -> Self {
        Self {
            n_trials,
            n_jobs: 1,
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the number of workers.
    #[must_use]
    pub fn n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The number of workers to spawn, resolving `0` to the CPU count.
    pub(crate) fn worker_count(&self) -> usize {
        if self.n_jobs > 0 {
            self.n_jobs
        } else {
            std::thread::available_parallelism().map_or(1, core::num::NonZeroUsize::get)
        }
    }
}

/// What one worker did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerReport {
    /// Trials finalized as `Complete`.
    pub completed: usize,
    /// Trials finalized as `Failed`.
    pub failed: usize,
    /// Trials finalized as `Pruned`.
    pub pruned: usize,
    /// Trials the worker could not finalize; they stay `Running`.
    pub aborted: usize,
}

impl WorkerReport {
    /// Trials this worker created.
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed + self.failed + self.pruned + self.aborted
    }

    fn merge(mut self, other: &WorkerReport) -> Self {
        self.completed += other.completed;
        self.failed += other.failed;
        self.pruned += other.pruned;
        self.aborted += other.aborted;
        self
    }
}

/// Result of [`Study::optimize_with`] and friends.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OptimizeReport {
    /// One report per worker, in spawn order.
    pub workers: Vec<WorkerReport>,
}

impl OptimizeReport {
    /// Sums the per-worker reports.
    #[must_use]
    pub fn totals(&self) -> WorkerReport {
        self.workers
            .iter()
            .fold(WorkerReport::default(), WorkerReport::merge)
    }
}

/// One worker's optimization loop.
///
/// Each driver owns its own [`Study`] handle. [`Study::optimize_with`]
/// spawns one driver per worker thread; a separate process attaches to a
/// shared study with [`Study::load`] and runs a driver directly:
///
/// ```
/// use study_coordinator::prelude::*;
///
/// let study = Study::new(Direction::Maximize);
/// let objective = |trial: &mut Trial<'_>| trial.suggest_float("x", 0.0, 1.0);
///
/// let report = Driver::new(study.clone(), &objective, &DriverConfig::new(5))
///     .run()
///     .unwrap();
/// assert_eq!(report.completed, 5);
/// assert_eq!(study.n_trials().unwrap(), 5);
/// ```
pub struct Driver<'a, O: ?Sized> {
    study: Study,
    objective: &'a O,
    n_trials: usize,
    retry: RetryPolicy,
    worker: usize,
}

impl<'a, O: Objective + ?Sized> Driver<'a, O> {
    /// Creates a driver for `study` running `objective` under `config`.
    ///
    /// `config.n_jobs` is ignored; a driver is always one worker.
    #[must_use]
    pub fn new(study: Study, objective: &'a O, config: &DriverConfig) -> Self {
        Self {
            study,
            objective,
            n_trials: config.n_trials,
            retry: config.retry,
            worker: 0,
        }
    }

    /// Sets the worker index reported in log events.
    #[must_use]
    pub fn worker_id(mut self, worker: usize) -> Self {
        self.worker = worker;
        self
    }

    /// Runs trials until the study holds `n_trials` trials or a hook asks
    /// to stop.
    ///
    /// Objective errors and panics finalize the trial as `Failed`; they never
    /// end the loop. A finalize that fails with a misuse error, or with a
    /// transient error after all retries, aborts that trial only.
    ///
    /// # Errors
    ///
    /// Returns the storage error if a trial cannot be created after all
    /// retries.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    pub fn run(&self) -> Result<WorkerReport> {
        let worker = self.worker;
        trace_info!(worker, study = self.study.name(), n_trials = self.n_trials, "worker started");

        let mut report = WorkerReport::default();
        loop {
            if self.objective.before_trial(&self.study).is_break() {
                break;
            }
            let created = self
                .retry
                .run("create_trial", || self.study.create_trial_within(self.n_trials))?;
            let Some(number) = created else {
                break;
            };

            let outcome = self.evaluate(number);
            let finalized = self
                .retry
                .run("finalize", || self.study.finalize(number, outcome.clone()));
            let record = match finalized {
                Ok(record) => record,
                Err(e) => {
                    trace_warn!(worker, trial = number, error = %e, "trial aborted");
                    report.aborted += 1;
                    continue;
                }
            };

            let flow = match record.state {
                TrialState::Complete => {
                    report.completed += 1;
                    self.objective.after_trial(&self.study, &record)
                }
                TrialState::Failed => {
                    report.failed += 1;
                    ControlFlow::Continue(())
                }
                TrialState::Pruned => {
                    report.pruned += 1;
                    ControlFlow::Continue(())
                }
                TrialState::Running => ControlFlow::Continue(()),
            };
            if flow.is_break() {
                break;
            }
        }

        trace_info!(
            worker,
            completed = report.completed,
            failed = report.failed,
            pruned = report.pruned,
            aborted = report.aborted,
            "worker finished"
        );
        Ok(report)
    }

    /// Runs the objective for trial `number` and turns whatever it did into
    /// an [`Outcome`].
    fn evaluate(&self, number: u64) -> Outcome {
        let mut trial = Trial::new(&self.study, number, self.retry);
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.objective.evaluate(&mut trial)));
        match result {
            Ok(Ok(value)) if value.is_nan() => {
                trace_debug!(trial = number, "objective returned NaN");
                Outcome::Failed("objective returned NaN".to_owned())
            }
            Ok(Ok(value)) => Outcome::Complete(value),
            Ok(Err(e)) if is_trial_pruned(&e) => Outcome::Pruned,
            Ok(Err(e)) => Outcome::Failed(e.to_string()),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                trace_debug!(trial = number, message = %message, "objective panicked");
                Outcome::Failed(format!("objective panicked: {message}"))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
