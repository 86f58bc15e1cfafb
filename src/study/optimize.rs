use crate::driver::{Driver, DriverConfig, OptimizeReport, WorkerReport};
use crate::error::{Error, Result};
use crate::objective::Objective;
use crate::trial::Trial;

use super::Study;

impl Study {
    /// Run trials on the calling thread until the study holds `n_trials`.
    ///
    /// `n_trials` is a study-wide total: trials created earlier, by this
    /// handle or by any other worker, count toward it.
    ///
    /// # Errors
    ///
    /// Returns a storage error if a trial cannot be created. Objective
    /// errors never surface here; they finalize their trial as `Failed`.
    ///
    /// # Examples
    ///
    /// ```
    /// use study_coordinator::parameter::{FloatParam, Parameter};
    /// use study_coordinator::sampler::RandomSampler;
    /// use study_coordinator::{Direction, Study};
    ///
    /// let study = Study::builder()
    ///     .sampler(RandomSampler::with_seed(42))
    ///     .build()
    ///     .unwrap();
    /// let x_param = FloatParam::new("x", -10.0, 10.0);
    ///
    /// let report = study
    ///     .optimize(10, |trial| {
    ///         let x = x_param.suggest(trial)?;
    ///         Ok::<_, study_coordinator::Error>(x * x)
    ///     })
    ///     .unwrap();
    ///
    /// assert_eq!(report.completed, 10);
    /// assert!(study.best_value().unwrap() >= 0.0);
    /// ```
    pub fn optimize<F, E>(&self, n_trials: usize, objective: F) -> Result<WorkerReport>
    where
        F: Fn(&mut Trial<'_>) -> core::result::Result<f64, E>,
        E: ToString + 'static,
    {
        let config = DriverConfig::new(n_trials);
        Driver::new(self.clone(), &objective, &config).run()
    }

    /// Run `n_jobs` worker threads until the study holds `n_trials`.
    ///
    /// `n_jobs == 0` spawns one worker per available CPU. Workers share the
    /// target, so exactly `n_trials` trials exist when the call returns
    /// (given the study held no more than that before).
    ///
    /// # Errors
    ///
    /// Returns the first worker's storage error, or [`Error::Worker`] if a
    /// worker thread panicked outside the objective.
    ///
    /// # Examples
    ///
    /// ```
    /// use study_coordinator::{Direction, Study};
    ///
    /// let study = Study::new(Direction::Minimize);
    /// let report = study
    ///     .optimize_parallel(20, 4, |trial| {
    ///         let x = trial.suggest_float("x", -1.0, 1.0)?;
    ///         Ok::<_, study_coordinator::Error>(x * x)
    ///     })
    ///     .unwrap();
    ///
    /// assert_eq!(report.workers.len(), 4);
    /// assert_eq!(study.n_trials().unwrap(), 20);
    /// ```
    pub fn optimize_parallel<F, E>(
        &self,
        n_trials: usize,
        n_jobs: usize,
        objective: F,
    ) -> Result<OptimizeReport>
    where
        F: Fn(&mut Trial<'_>) -> core::result::Result<f64, E> + Sync,
        E: ToString + 'static,
    {
        let config = DriverConfig::new(n_trials).n_jobs(n_jobs);
        self.optimize_with(&config, &objective)
    }

    /// Run a pool of workers described by `config`.
    ///
    /// Each worker is a scoped OS thread running a [`Driver`] on its own
    /// clone of this study. With a single worker the driver runs on the
    /// calling thread.
    ///
    /// # Errors
    ///
    /// Returns the first worker's storage error, or [`Error::Worker`] if a
    /// worker thread panicked outside the objective.
    pub fn optimize_with<O>(&self, config: &DriverConfig, objective: &O) -> Result<OptimizeReport>
    where
        O: Objective + Sync + ?Sized,
    {
        let n_workers = config.worker_count();

        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!(
            "optimize",
            study = %self.name,
            n_trials = config.n_trials,
            n_workers,
            direction = %self.direction
        )
        .entered();

        if n_workers == 1 {
            let report = Driver::new(self.clone(), objective, config).run()?;
            return Ok(OptimizeReport {
                workers: vec![report],
            });
        }

        let results: Vec<Result<WorkerReport>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..n_workers)
                .map(|worker| {
                    let driver = Driver::new(self.clone(), objective, config).worker_id(worker);
                    s.spawn(move || driver.run())
                })
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .map_err(|_| Error::Worker("worker thread panicked".to_owned()))
                        .and_then(|r| r)
                })
                .collect()
        });

        let workers = results.into_iter().collect::<Result<Vec<_>>>()?;
        Ok(OptimizeReport { workers })
    }
}
