use std::sync::Arc;

use tokio::task::JoinSet;

use crate::driver::{Driver, DriverConfig, OptimizeReport, WorkerReport};
use crate::error::{Error, Result};
use crate::objective::Objective;

use super::Study;

impl Study {
    /// Run a pool of workers on tokio's blocking thread pool.
    ///
    /// Like [`optimize_with`](Self::optimize_with), but each worker's
    /// [`Driver`] loop is wrapped in
    /// [`spawn_blocking`](tokio::task::spawn_blocking) and the workers are
    /// collected in a [`JoinSet`], keeping the async runtime responsive for
    /// CPU-bound objectives.
    ///
    /// Reports are returned in completion order.
    ///
    /// # Errors
    ///
    /// Returns the first worker's storage error, or [`Error::Worker`] if a
    /// blocking task panicked or was cancelled. The error is returned only
    /// after every worker has stopped, so no trial is created once this
    /// call has returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use study_coordinator::{Direction, DriverConfig, Study};
    ///
    /// # #[cfg(feature = "async")]
    /// # async fn example() -> study_coordinator::Result<()> {
    /// let study = Study::new(Direction::Minimize);
    /// let objective = |trial: &mut study_coordinator::Trial<'_>| {
    ///     let x = trial.suggest_float("x", -10.0, 10.0)?;
    ///     Ok::<_, study_coordinator::Error>(x * x)
    /// };
    ///
    /// study
    ///     .optimize_async(DriverConfig::new(10).n_jobs(4), objective)
    ///     .await?;
    ///
    /// assert_eq!(study.n_trials()?, 10);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn optimize_async<O>(&self, config: DriverConfig, objective: O) -> Result<OptimizeReport>
    where
        O: Objective + Send + Sync + 'static,
    {
        let n_workers = config.worker_count();
        trace_info!(
            study = %self.name,
            n_trials = config.n_trials,
            n_workers,
            "async optimization started"
        );

        let objective = Arc::new(objective);
        let config = Arc::new(config);
        let mut join_set: JoinSet<Result<WorkerReport>> = JoinSet::new();

        for worker in 0..n_workers {
            let study = self.clone();
            let objective = Arc::clone(&objective);
            let config = Arc::clone(&config);
            join_set.spawn(async move {
                tokio::task::spawn_blocking(move || {
                    Driver::new(study, objective.as_ref(), &config)
                        .worker_id(worker)
                        .run()
                })
                .await
                .map_err(|e| Error::Worker(e.to_string()))?
            });
        }

        // Blocking tasks cannot be aborted, so every worker is awaited
        // before the first error is returned.
        let mut workers = Vec::with_capacity(n_workers);
        let mut first_error = None;
        while let Some(joined) = join_set.join_next().await {
            match joined.map_err(|e| Error::Worker(e.to_string())).and_then(|r| r) {
                Ok(report) => workers.push(report),
                Err(e) => {
                    trace_warn!(error = %e, "async worker failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(OptimizeReport { workers }),
        }
    }
}
