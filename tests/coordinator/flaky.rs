//! A storage wrapper that drops calls to exercise retry paths.

use std::sync::atomic::{AtomicUsize, Ordering};

use study_coordinator::storage::{MemoryStorage, Storage, StudyInfo};
use study_coordinator::{
    Direction, Distribution, Error, Outcome, ParamValue, Result, StudyId, TrialRecord, TrialState,
};

/// Fails every `period`-th mutation with `StorageUnavailable`.
///
/// Failures happen before the call reaches the inner store, so a failed
/// call has no effect and retrying it is safe.
pub struct FlakyStorage {
    inner: MemoryStorage,
    period: usize,
    calls: AtomicUsize,
    pub injected: AtomicUsize,
}

impl FlakyStorage {
    pub fn new(period: usize) -> Self {
        Self {
            inner: MemoryStorage::new(),
            period,
            calls: AtomicUsize::new(0),
            injected: AtomicUsize::new(0),
        }
    }

    fn gate(&self) -> Result<()> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n % self.period == 0 {
            self.injected.fetch_add(1, Ordering::SeqCst);
            Err(Error::StorageUnavailable("injected outage".into()))
        } else {
            Ok(())
        }
    }
}

impl Storage for FlakyStorage {
    fn create_study(&self, name: &str, direction: Direction) -> Result<StudyId> {
        self.inner.create_study(name, direction)
    }

    fn study_id(&self, name: &str) -> Result<StudyId> {
        self.inner.study_id(name)
    }

    fn study_direction(&self, study: StudyId) -> Result<Direction> {
        self.inner.study_direction(study)
    }

    fn studies(&self) -> Result<Vec<StudyInfo>> {
        self.inner.studies()
    }

    fn create_trial_bounded(&self, study: StudyId, limit: usize) -> Result<Option<u64>> {
        self.gate()?;
        self.inner.create_trial_bounded(study, limit)
    }

    fn set_trial_param(
        &self,
        study: StudyId,
        number: u64,
        name: &str,
        distribution: &Distribution,
        value: ParamValue,
    ) -> Result<ParamValue> {
        self.gate()?;
        self.inner
            .set_trial_param(study, number, name, distribution, value)
    }

    fn finish_trial(&self, study: StudyId, number: u64, outcome: Outcome) -> Result<TrialRecord> {
        self.gate()?;
        self.inner.finish_trial(study, number, outcome)
    }

    fn trial(&self, study: StudyId, number: u64) -> Result<TrialRecord> {
        self.inner.trial(study, number)
    }

    fn trials(&self, study: StudyId, states: Option<&[TrialState]>) -> Result<Vec<TrialRecord>> {
        self.inner.trials(study, states)
    }
}

/// A store whose every call fails.
pub struct DownStorage;

impl Storage for DownStorage {
    fn create_study(&self, _: &str, _: Direction) -> Result<StudyId> {
        Ok(0)
    }

    fn study_id(&self, name: &str) -> Result<StudyId> {
        Err(Error::StudyNotFound(name.to_owned()))
    }

    fn study_direction(&self, _: StudyId) -> Result<Direction> {
        Ok(Direction::Minimize)
    }

    fn studies(&self) -> Result<Vec<StudyInfo>> {
        Ok(Vec::new())
    }

    fn create_trial_bounded(&self, _: StudyId, _: usize) -> Result<Option<u64>> {
        Err(Error::StorageUnavailable("connection refused".into()))
    }

    fn set_trial_param(
        &self,
        _: StudyId,
        _: u64,
        _: &str,
        _: &Distribution,
        _: ParamValue,
    ) -> Result<ParamValue> {
        Err(Error::StorageUnavailable("connection refused".into()))
    }

    fn finish_trial(&self, _: StudyId, _: u64, _: Outcome) -> Result<TrialRecord> {
        Err(Error::StorageUnavailable("connection refused".into()))
    }

    fn trial(&self, _: StudyId, number: u64) -> Result<TrialRecord> {
        Err(Error::TrialNotFound(number))
    }

    fn trials(&self, _: StudyId, _: Option<&[TrialState]>) -> Result<Vec<TrialRecord>> {
        Err(Error::StorageUnavailable("connection refused".into()))
    }
}
