use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use super::{StudyInfo, Storage, check_param, state_matches};
use crate::distribution::Distribution;
use crate::error::{Error, Result};
use crate::param::ParamValue;
use crate::record::{Outcome, TrialRecord};
use crate::types::{Direction, StudyId, TrialState};

type TrialCell = Arc<Mutex<TrialRecord>>;

struct StudyEntry {
    name: String,
    direction: Direction,
    /// Index = trial number. The write lock is taken only to append.
    trials: RwLock<Vec<TrialCell>>,
}

/// In-memory trial storage (the default).
///
/// Studies live in a `Vec` behind a read-write lock. Each study keeps its
/// trials in a second `Vec` behind its own read-write lock, and each trial
/// sits behind its own mutex:
///
/// - `create_trial` takes the study's write lock, so the new number is
///   always the current length and numbering stays dense.
/// - `set_trial_param` and `finish_trial` take the study's read lock only
///   long enough to clone the trial's cell, then lock that trial. Work on
///   different trials proceeds in parallel; work on one trial is serialized.
///
/// Suitable for studies whose workers are threads of one process.
#[derive(Default)]
pub struct MemoryStorage {
    studies: RwLock<Vec<Arc<StudyEntry>>>,
}

impl MemoryStorage {
    /// Creates a new, empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a study without checking for name clashes.
    pub(crate) fn push_study(&self, name: &str, direction: Direction) -> StudyId {
        push_entry(&mut self.studies.write(), name, direction)
    }

    fn study(&self, study: StudyId) -> Result<Arc<StudyEntry>> {
        usize::try_from(study)
            .ok()
            .and_then(|idx| self.studies.read().get(idx).cloned())
            .ok_or_else(|| Error::StudyNotFound(format!("#{study}")))
    }

    fn cell(&self, study: StudyId, number: u64) -> Result<TrialCell> {
        let entry = self.study(study)?;
        let trials = entry.trials.read();
        usize::try_from(number)
            .ok()
            .and_then(|idx| trials.get(idx).cloned())
            .ok_or(Error::TrialNotFound(number))
    }
}

impl Storage for MemoryStorage {
    fn create_study(&self, name: &str, direction: Direction) -> Result<StudyId> {
        // Hold the write lock across the check so two creators cannot both
        // pass it.
        let mut studies = self.studies.write();
        if studies.iter().any(|s| s.name == name) {
            return Err(Error::DuplicateStudy(name.to_owned()));
        }
        Ok(push_entry(&mut studies, name, direction))
    }

    fn study_id(&self, name: &str) -> Result<StudyId> {
        self.studies
            .read()
            .iter()
            .position(|s| s.name == name)
            .map(|idx| idx as StudyId)
            .ok_or_else(|| Error::StudyNotFound(name.to_owned()))
    }

    fn study_direction(&self, study: StudyId) -> Result<Direction> {
        Ok(self.study(study)?.direction)
    }

    fn studies(&self) -> Result<Vec<StudyInfo>> {
        Ok(self
            .studies
            .read()
            .iter()
            .enumerate()
            .map(|(idx, s)| StudyInfo {
                id: idx as StudyId,
                name: s.name.clone(),
                direction: s.direction,
            })
            .collect())
    }

    fn create_trial_bounded(&self, study: StudyId, limit: usize) -> Result<Option<u64>> {
        let entry = self.study(study)?;
        let mut trials = entry.trials.write();
        if trials.len() >= limit {
            return Ok(None);
        }
        let number = trials.len() as u64;
        trials.push(Arc::new(Mutex::new(TrialRecord::new(number, Utc::now()))));
        Ok(Some(number))
    }

    fn set_trial_param(
        &self,
        study: StudyId,
        number: u64,
        name: &str,
        distribution: &Distribution,
        value: ParamValue,
    ) -> Result<ParamValue> {
        check_param(name, distribution, &value)?;
        let cell = self.cell(study, number)?;
        let mut record = cell.lock();
        record.record_param(name, distribution, value)
    }

    fn finish_trial(&self, study: StudyId, number: u64, outcome: Outcome) -> Result<TrialRecord> {
        let cell = self.cell(study, number)?;
        let mut record = cell.lock();
        record.finish(outcome, Utc::now())?;
        Ok(record.clone())
    }

    fn trial(&self, study: StudyId, number: u64) -> Result<TrialRecord> {
        Ok(self.cell(study, number)?.lock().clone())
    }

    fn trials(&self, study: StudyId, states: Option<&[TrialState]>) -> Result<Vec<TrialRecord>> {
        let entry = self.study(study)?;
        let cells: Vec<TrialCell> = entry.trials.read().clone();
        Ok(cells
            .iter()
            .map(|cell| cell.lock().clone())
            .filter(|t| state_matches(states, t.state))
            .collect())
    }

    fn n_trials(&self, study: StudyId) -> Result<usize> {
        Ok(self.study(study)?.trials.read().len())
    }
}

fn push_entry(studies: &mut Vec<Arc<StudyEntry>>, name: &str, direction: Direction) -> StudyId {
    studies.push(Arc::new(StudyEntry {
        name: name.to_owned(),
        direction,
        trials: RwLock::new(Vec::new()),
    }));
    (studies.len() - 1) as StudyId
}
