//! Trial storage backends.
//!
//! The [`Storage`] trait is the coordination store: the single place where
//! trial numbers are allocated and trial records are mutated. Every
//! [`Study`](crate::Study) owns an `Arc<dyn Storage>`, so one backend is
//! transparently shared by all worker threads, and backends that persist to
//! disk are shared by independent processes as well.
//!
//! # Available backends
//!
//! | Backend | Description | Feature flag |
//! |---------|-------------|-------------|
//! | [`MemoryStorage`] | Trials in memory, one lock per trial (the default) | none |
//! | `JournalStorage` | Append-only JSONL operation log with `fs2` file locking | `journal` |
//! | `SqliteStorage` | `SQLite` tables, one `BEGIN IMMEDIATE` transaction per mutation | `sqlite` |
//!
//! # Guarantees every backend provides
//!
//! - Trial numbers of a study are dense, zero-based and never reused, even
//!   when [`create_trial`](Storage::create_trial) races with itself.
//! - [`set_trial_param`](Storage::set_trial_param) and
//!   [`finish_trial`](Storage::finish_trial) are atomic per trial: the trial
//!   is checked and updated without any other writer interleaving.
//! - Reads return clones of states the backend actually reached.
//!
//! The trait makes no assumption about where the backend lives, so a
//! network client forwarding each call to a remote coordinator is a valid
//! implementation; transport failures must surface as
//! [`Error::StorageUnavailable`](crate::Error::StorageUnavailable).

#[cfg(feature = "journal")]
mod journal;
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

use std::sync::Arc;

#[cfg(feature = "journal")]
pub use journal::JournalStorage;
pub use memory::MemoryStorage;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

use crate::distribution::Distribution;
use crate::error::{Error, Result};
use crate::param::ParamValue;
use crate::record::{Outcome, TrialRecord};
use crate::types::{Direction, StudyId, TrialState};

/// Summary of a study known to a storage backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StudyInfo {
    /// The backend-assigned identifier.
    pub id: StudyId,
    /// The unique study name.
    pub name: String,
    /// The optimization direction.
    pub direction: Direction,
}

/// Trait implemented by every coordination backend.
///
/// Implementations must be `Send + Sync` because a study is shared across
/// worker threads.
pub trait Storage: Send + Sync {
    /// Registers a new study.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateStudy`] if `name` is taken.
    fn create_study(&self, name: &str, direction: Direction) -> Result<StudyId>;

    /// Looks up a study by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StudyNotFound`] if no study has that name.
    fn study_id(&self, name: &str) -> Result<StudyId>;

    /// Returns the direction of a study.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StudyNotFound`] for an unknown id.
    fn study_direction(&self, study: StudyId) -> Result<Direction>;

    /// Lists every study in the backend.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the listing cannot be read.
    fn studies(&self) -> Result<Vec<StudyInfo>>;

    /// Appends a `Running` trial if the study holds fewer than `limit`
    /// trials, returning its number, or `None` when the limit is reached.
    ///
    /// The count check and the append happen atomically, so concurrent
    /// callers sharing one limit create exactly `limit` trials in total.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StudyNotFound`] or a backend error.
    fn create_trial_bounded(&self, study: StudyId, limit: usize) -> Result<Option<u64>>;

    /// Appends a `Running` trial and returns its number.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StudyNotFound`] or a backend error.
    fn create_trial(&self, study: StudyId) -> Result<u64> {
        self.create_trial_bounded(study, usize::MAX)?
            .ok_or(Error::Internal("unbounded trial creation was refused"))
    }

    /// Records a parameter value unless the trial already has one for
    /// `name`, and returns the value that ends up stored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTrialState`] unless the trial is running,
    /// [`Error::DistributionMismatch`] if `name` was recorded under a
    /// different distribution, a validation error if `distribution` is
    /// malformed, [`Error::SamplerOutOfRange`] if `value` lies outside it,
    /// [`Error::TrialNotFound`], or a backend error.
    fn set_trial_param(
        &self,
        study: StudyId,
        number: u64,
        name: &str,
        distribution: &Distribution,
        value: ParamValue,
    ) -> Result<ParamValue>;

    /// Moves a running trial into the terminal state of `outcome` and
    /// returns the finished record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTrialState`] if the trial already finished,
    /// [`Error::NanValue`], [`Error::TrialNotFound`], or a backend error.
    fn finish_trial(&self, study: StudyId, number: u64, outcome: Outcome) -> Result<TrialRecord>;

    /// Returns a snapshot of one trial.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TrialNotFound`] or a backend error.
    fn trial(&self, study: StudyId, number: u64) -> Result<TrialRecord>;

    /// Returns snapshots of the study's trials ordered by number,
    /// optionally restricted to `states`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StudyNotFound`] or a backend error.
    fn trials(&self, study: StudyId, states: Option<&[TrialState]>) -> Result<Vec<TrialRecord>>;

    /// Returns how many trials the study holds, in any state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StudyNotFound`] or a backend error.
    fn n_trials(&self, study: StudyId) -> Result<usize> {
        Ok(self.trials(study, None)?.len())
    }
}

impl<S: Storage + ?Sized> Storage for Arc<S> {
    fn create_study(&self, name: &str, direction: Direction) -> Result<StudyId> {
        (**self).create_study(name, direction)
    }

    fn study_id(&self, name: &str) -> Result<StudyId> {
        (**self).study_id(name)
    }

    fn study_direction(&self, study: StudyId) -> Result<Direction> {
        (**self).study_direction(study)
    }

    fn studies(&self) -> Result<Vec<StudyInfo>> {
        (**self).studies()
    }

    fn create_trial_bounded(&self, study: StudyId, limit: usize) -> Result<Option<u64>> {
        (**self).create_trial_bounded(study, limit)
    }

    fn create_trial(&self, study: StudyId) -> Result<u64> {
        (**self).create_trial(study)
    }

    fn set_trial_param(
        &self,
        study: StudyId,
        number: u64,
        name: &str,
        distribution: &Distribution,
        value: ParamValue,
    ) -> Result<ParamValue> {
        (**self).set_trial_param(study, number, name, distribution, value)
    }

    fn finish_trial(&self, study: StudyId, number: u64, outcome: Outcome) -> Result<TrialRecord> {
        (**self).finish_trial(study, number, outcome)
    }

    fn trial(&self, study: StudyId, number: u64) -> Result<TrialRecord> {
        (**self).trial(study, number)
    }

    fn trials(&self, study: StudyId, states: Option<&[TrialState]>) -> Result<Vec<TrialRecord>> {
        (**self).trials(study, states)
    }

    fn n_trials(&self, study: StudyId) -> Result<usize> {
        (**self).n_trials(study)
    }
}

/// Rejects a parameter a backend must not record: a malformed distribution
/// or a value outside it.
///
/// Persistent backends call this before writing, so nothing reaches disk
/// that a later replay could not decode.
pub(crate) fn check_param(
    name: &str,
    distribution: &Distribution,
    value: &ParamValue,
) -> Result<()> {
    distribution.validate()?;
    if distribution.contains(value) {
        Ok(())
    } else {
        Err(Error::SamplerOutOfRange {
            name: name.to_owned(),
            value: value.to_string(),
        })
    }
}

/// Returns `true` if `state` passes an optional state filter.
pub(crate) fn state_matches(states: Option<&[TrialState]>, state: TrialState) -> bool {
    states.is_none_or(|s| s.contains(&state))
}
