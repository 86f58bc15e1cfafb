//! The study: the coordinator facade every worker talks to.

use core::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::distribution::Distribution;
use crate::driver::RetryPolicy;
use crate::error::{Error, Result, is_trial_pruned};
use crate::param::ParamValue;
use crate::record::{Outcome, TrialRecord};
use crate::sampler::{RandomSampler, Sampler};
use crate::storage::{MemoryStorage, Storage};
use crate::trial::Trial;
use crate::types::{Direction, StudyId, TrialState};

mod analysis;
mod builder;
mod optimize;

#[cfg(feature = "async")]
mod async_impl;

pub use analysis::StudySummary;
pub use builder::StudyBuilder;

/// A handle to one optimization study held by a storage backend.
///
/// A `Study` is cheap to clone: clones share the same storage and sampler,
/// so each worker thread can own its own handle. Every mutation is routed
/// through the [`Storage`] backend, which makes the backend the single
/// owner of the trial records; the study itself keeps no trial state.
///
/// # Examples
///
/// ```
/// use study_coordinator::{Direction, Distribution, Outcome, Study};
///
/// let study = Study::new(Direction::Maximize);
///
/// let number = study.create_trial().unwrap();
/// let x = study
///     .suggest(number, "x", &Distribution::int(0, 100))
///     .unwrap();
/// study
///     .finalize(number, Outcome::Complete(x.as_int().unwrap() as f64))
///     .unwrap();
///
/// assert_eq!(study.best_trial().unwrap().number, 0);
/// ```
#[derive(Clone)]
pub struct Study {
    pub(crate) id: StudyId,
    pub(crate) name: Arc<str>,
    /// The optimization direction.
    pub(crate) direction: Direction,
    /// The sampler used to generate parameter values.
    pub(crate) sampler: Arc<dyn Sampler>,
    /// Trial storage backend (default: [`MemoryStorage`]).
    pub(crate) storage: Arc<dyn Storage>,
}

impl fmt::Debug for Study {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Study")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("direction", &self.direction)
            .finish_non_exhaustive()
    }
}

impl Study {
    /// Create a new study with the given optimization direction.
    ///
    /// The study lives in a fresh [`MemoryStorage`] under a generated name
    /// and samples with a [`RandomSampler`].
    ///
    /// # Examples
    ///
    /// ```
    /// use study_coordinator::{Direction, Study};
    ///
    /// let study = Study::new(Direction::Minimize);
    /// assert_eq!(study.direction(), Direction::Minimize);
    /// assert!(study.name().starts_with("no-name-"));
    /// ```
    #[must_use]
    pub fn new(direction: Direction) -> Self {
        let storage = MemoryStorage::new();
        let name = generated_name();
        let id = storage.push_study(&name, direction);
        Self {
            id,
            name: name.into(),
            direction,
            sampler: Arc::new(RandomSampler::new()),
            storage: Arc::new(storage),
        }
    }

    /// Return a [`StudyBuilder`] for constructing a study with a fluent API.
    ///
    /// # Examples
    ///
    /// ```
    /// use study_coordinator::prelude::*;
    ///
    /// let study = Study::builder()
    ///     .name("tuning")
    ///     .maximize()
    ///     .sampler(RandomSampler::with_seed(42))
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(study.direction(), Direction::Maximize);
    /// ```
    #[must_use]
    pub fn builder() -> StudyBuilder {
        StudyBuilder::new()
    }

    /// Attach to an existing study by name.
    ///
    /// This is how a worker process joins a study another process created
    /// on a shared backend. The direction is read from the backend; the
    /// sampler defaults to [`RandomSampler`] (see [`set_sampler`](Self::set_sampler)).
    ///
    /// # Errors
    ///
    /// Returns [`Error::StudyNotFound`] if the backend has no such study, or
    /// a storage error.
    pub fn load(name: &str, storage: Arc<dyn Storage>) -> Result<Self> {
        let id = storage.study_id(name)?;
        let direction = storage.study_direction(id)?;
        trace_info!(study = name, id, "study loaded");
        Ok(Self {
            id,
            name: name.into(),
            direction,
            sampler: Arc::new(RandomSampler::new()),
            storage,
        })
    }

    /// The backend identifier of the study.
    #[must_use]
    pub fn id(&self) -> StudyId {
        self.id
    }

    /// The unique study name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the optimization direction.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The storage backend shared by every handle of this study.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Replace the sampler of this handle.
    ///
    /// Other clones keep the sampler they were created with.
    pub fn set_sampler(&mut self, sampler: impl Sampler + 'static) {
        self.sampler = Arc::new(sampler);
    }

    /// Append a new `Running` trial and return its number.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn create_trial(&self) -> Result<u64> {
        let number = self.storage.create_trial(self.id)?;
        trace_debug!(study = %self.name, trial = number, "trial created");
        Ok(number)
    }

    /// Append a new `Running` trial unless the study already holds `limit`
    /// trials.
    ///
    /// Concurrent callers sharing one `limit` create exactly `limit` trials
    /// between them.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn create_trial_within(&self, limit: usize) -> Result<Option<u64>> {
        let number = self.storage.create_trial_bounded(self.id, limit)?;
        if let Some(number) = number {
            trace_debug!(study = %self.name, trial = number, limit, "trial created");
        }
        Ok(number)
    }

    /// Return the value of parameter `name` in trial `number`, sampling and
    /// recording one if the trial does not have it yet.
    ///
    /// The sampler sees every `Complete` trial of the study. Two racing
    /// requests for the same parameter may both sample, but only the first
    /// value to reach the backend is recorded and both callers receive it.
    ///
    /// # Errors
    ///
    /// - A validation error if `distribution` is malformed.
    /// - [`Error::InvalidTrialState`] if the trial is not running.
    /// - [`Error::DistributionMismatch`] if `name` was suggested in this trial
    ///   under a different distribution.
    /// - [`Error::SamplerOutOfRange`] if the sampler returns a value outside
    ///   `distribution`.
    /// - [`Error::TrialNotFound`] or a storage error.
    pub fn suggest(&self, number: u64, name: &str, distribution: &Distribution) -> Result<ParamValue> {
        distribution.validate()?;

        let record = self.storage.trial(self.id, number)?;
        record.ensure_running("suggest")?;
        if let Some(existing) = record.lookup_param(name, distribution)? {
            return Ok(existing);
        }

        let history = self
            .storage
            .trials(self.id, Some(&[TrialState::Complete]))?;
        let value = self.sampler.sample(name, distribution, number, &history);
        if !distribution.contains(&value) {
            return Err(Error::SamplerOutOfRange {
                name: name.to_owned(),
                value: value.to_string(),
            });
        }

        let stored = self
            .storage
            .set_trial_param(self.id, number, name, distribution, value)?;
        trace_debug!(trial = number, param = name, value = %stored, "parameter suggested");
        Ok(stored)
    }

    /// Move trial `number` into the terminal state described by `outcome`.
    ///
    /// Returns the finalized record. From this point the trial is part of
    /// the history every later [`suggest`](Self::suggest) hands to the
    /// sampler (if `Complete`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTrialState`] if the trial already finished,
    /// [`Error::NanValue`] for `Outcome::Complete(NaN)`,
    /// [`Error::TrialNotFound`], or a storage error.
    pub fn finalize(&self, number: u64, outcome: Outcome) -> Result<TrialRecord> {
        let record = self.storage.finish_trial(self.id, number, outcome)?;
        trace_info!(
            study = %self.name,
            trial = number,
            state = %record.state,
            value = ?record.value,
            "trial finalized"
        );
        Ok(record)
    }

    /// Return a snapshot of trial `number`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TrialNotFound`] or a storage error.
    pub fn trial(&self, number: u64) -> Result<TrialRecord> {
        self.storage.trial(self.id, number)
    }

    /// Return snapshots of all trials, ordered by number.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn trials(&self) -> Result<Vec<TrialRecord>> {
        self.storage.trials(self.id, None)
    }

    /// Return snapshots of the trials in any of `states`, ordered by number.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn trials_with_state(&self, states: &[TrialState]) -> Result<Vec<TrialRecord>> {
        self.storage.trials(self.id, Some(states))
    }

    /// Return the number of trials in any state.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn n_trials(&self) -> Result<usize> {
        self.storage.n_trials(self.id)
    }

    /// Create a trial and return a handle for requesting its parameters.
    ///
    /// Pair with [`tell`](Self::tell) when the evaluation loop lives
    /// outside the library.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    ///
    /// # Examples
    ///
    /// ```
    /// use study_coordinator::{Direction, Study};
    ///
    /// let study = Study::new(Direction::Minimize);
    ///
    /// let mut trial = study.ask().unwrap();
    /// let x = trial.suggest_float("x", -5.0, 5.0).unwrap();
    /// study.tell(trial, Ok::<_, String>(x * x)).unwrap();
    ///
    /// assert_eq!(study.n_trials().unwrap(), 1);
    /// ```
    pub fn ask(&self) -> Result<Trial<'_>> {
        let number = self.create_trial()?;
        Ok(Trial::new(self, number, RetryPolicy::default()))
    }

    /// Report the result of a trial obtained from [`ask`](Self::ask).
    ///
    /// `Ok(value)` completes the trial (a NaN value fails it instead), an
    /// error that signals pruning prunes it, and any other error fails it
    /// with the error's message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTrialState`] if the trial already finished,
    /// or a storage error.
    pub fn tell<E: ToString + 'static>(
        &self,
        trial: Trial<'_>,
        value: core::result::Result<f64, E>,
    ) -> Result<TrialRecord> {
        let outcome = match value {
            Ok(v) if v.is_nan() => Outcome::Failed("objective returned NaN".to_owned()),
            Ok(v) => Outcome::Complete(v),
            Err(e) if is_trial_pruned(&e) => Outcome::Pruned,
            Err(e) => Outcome::Failed(e.to_string()),
        };
        self.finalize(trial.number(), outcome)
    }
}

fn generated_name() -> String {
    format!("no-name-{}", Uuid::new_v4())
}
