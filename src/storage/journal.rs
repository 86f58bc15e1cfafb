//! JSONL-based journal storage backend.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{StudyInfo, Storage, check_param, state_matches};
use crate::distribution::Distribution;
use crate::error::{Error, Result};
use crate::param::ParamValue;
use crate::record::{Outcome, TrialRecord};
use crate::types::{Direction, StudyId, TrialState};

/// One line of the journal.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalOp {
    CreateStudy {
        study_id: StudyId,
        name: String,
        direction: Direction,
    },
    CreateTrial {
        study_id: StudyId,
        number: u64,
        created_at: DateTime<Utc>,
    },
    SetParam {
        study_id: StudyId,
        number: u64,
        name: String,
        distribution: Distribution,
        value: ParamValue,
    },
    FinishTrial {
        study_id: StudyId,
        number: u64,
        state: TrialState,
        /// `f64` rendered with `Display`, which keeps infinities that JSON
        /// numbers cannot express.
        value: Option<String>,
        fail_reason: Option<String>,
        completed_at: DateTime<Utc>,
    },
}

struct ReplayStudy {
    name: String,
    direction: Direction,
    trials: Vec<TrialRecord>,
}

/// The state obtained by applying every journal line up to `offset`.
#[derive(Default)]
struct Replay {
    offset: u64,
    studies: Vec<ReplayStudy>,
}

impl Replay {
    fn study(&self, study: StudyId) -> Result<&ReplayStudy> {
        usize::try_from(study)
            .ok()
            .and_then(|idx| self.studies.get(idx))
            .ok_or_else(|| Error::StudyNotFound(format!("#{study}")))
    }

    fn trial(&self, study: StudyId, number: u64) -> Result<&TrialRecord> {
        let entry = self.study(study)?;
        usize::try_from(number)
            .ok()
            .and_then(|idx| entry.trials.get(idx))
            .ok_or(Error::TrialNotFound(number))
    }

    fn trial_mut(&mut self, study: StudyId, number: u64) -> Result<&mut TrialRecord> {
        let entry = usize::try_from(study)
            .ok()
            .and_then(|idx| self.studies.get_mut(idx))
            .ok_or_else(|| Error::StudyNotFound(format!("#{study}")))?;
        usize::try_from(number)
            .ok()
            .and_then(|idx| entry.trials.get_mut(idx))
            .ok_or(Error::TrialNotFound(number))
    }

    /// Applies one operation. Operations were validated before they were
    /// appended, so any failure here means the file is damaged.
    fn apply(&mut self, op: JournalOp) -> Result<()> {
        match op {
            JournalOp::CreateStudy {
                study_id,
                name,
                direction,
            } => {
                if study_id != self.studies.len() as StudyId {
                    return Err(Error::CorruptStorage(format!(
                        "study id {study_id} out of sequence"
                    )));
                }
                self.studies.push(ReplayStudy {
                    name,
                    direction,
                    trials: Vec::new(),
                });
            }
            JournalOp::CreateTrial {
                study_id,
                number,
                created_at,
            } => {
                let entry = usize::try_from(study_id)
                    .ok()
                    .and_then(|idx| self.studies.get_mut(idx))
                    .ok_or_else(|| corrupt(format!("trial for unknown study {study_id}")))?;
                if number != entry.trials.len() as u64 {
                    return Err(corrupt(format!("trial number {number} out of sequence")));
                }
                entry.trials.push(TrialRecord::new(number, created_at));
            }
            JournalOp::SetParam {
                study_id,
                number,
                name,
                distribution,
                value,
            } => {
                self.trial_mut(study_id, number)
                    .and_then(|t| t.record_param(&name, &distribution, value))
                    .map_err(|e| corrupt(format!("replaying set_param: {e}")))?;
            }
            JournalOp::FinishTrial {
                study_id,
                number,
                state,
                value,
                fail_reason,
                completed_at,
            } => {
                let outcome = decode_outcome(state, value, fail_reason)?;
                self.trial_mut(study_id, number)
                    .and_then(|t| t.finish(outcome, completed_at))
                    .map_err(|e| corrupt(format!("replaying finish_trial: {e}")))?;
            }
        }
        Ok(())
    }
}

/// A storage backend that records every mutation as a JSON line in a shared
/// file.
///
/// The file is an operation log, not a snapshot: replaying it from the start
/// reconstructs every study. Independent processes (or independent
/// `JournalStorage` values in one process) can share the same path:
///
/// - A mutation takes an exclusive file lock, replays the lines it has not
///   seen yet, validates the request against the replayed state, appends
///   one line, flushes and releases the lock. This gives all writers one
///   global order, so trial numbers stay dense across processes.
/// - A read takes a shared file lock and replays new lines only.
///
/// A line without its trailing newline is the residue of a writer that
/// died mid-append. Readers skip it; the next writer truncates it.
///
/// # Examples
///
/// ```no_run
/// use study_coordinator::storage::JournalStorage;
///
/// let storage = JournalStorage::new("study.jsonl");
/// ```
pub struct JournalStorage {
    path: PathBuf,
    replay: Mutex<Replay>,
}

impl JournalStorage {
    /// Creates a journal storage backed by `path`.
    ///
    /// The file does not need to exist yet; it is created on the first
    /// write. Existing lines are replayed lazily on first access.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            replay: Mutex::new(Replay::default()),
        }
    }

    /// Opens a journal file and replays it immediately.
    ///
    /// If the file does not exist, returns an empty storage (no error).
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the file cannot be read, or
    /// [`Error::CorruptStorage`] if a line cannot be replayed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let storage = Self::new(path);
        storage.read(|_| Ok(()))?;
        Ok(storage)
    }

    /// The path of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `f` against an up-to-date replay under a shared file lock.
    fn read<T>(&self, f: impl FnOnce(&Replay) -> Result<T>) -> Result<T> {
        let mut replay = self.replay.lock();
        match File::open(&self.path) {
            Ok(mut file) => {
                file.lock_shared().map_err(unavailable)?;
                let caught_up = catch_up(&mut replay, &mut file, false);
                file.unlock().map_err(unavailable)?;
                caught_up?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(unavailable(e)),
        }
        f(&replay)
    }

    /// Runs `f` against an up-to-date replay under an exclusive file lock
    /// and appends the operation it returns, if any.
    fn write<T>(&self, f: impl FnOnce(&Replay) -> Result<(T, Option<JournalOp>)>) -> Result<T> {
        let mut replay = self.replay.lock();
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(unavailable)?;
        file.lock_exclusive().map_err(unavailable)?;
        let result = append_locked(&mut replay, &mut file, f);
        file.unlock().map_err(unavailable)?;
        result
    }
}

fn append_locked<T>(
    replay: &mut Replay,
    file: &mut File,
    f: impl FnOnce(&Replay) -> Result<(T, Option<JournalOp>)>,
) -> Result<T> {
    catch_up(replay, file, true)?;
    let (out, op) = f(replay)?;
    if let Some(op) = op {
        let mut line = serde_json::to_string(&op).map_err(|e| corrupt(e.to_string()))?;
        line.push('\n');
        file.write_all(line.as_bytes()).map_err(unavailable)?;
        file.flush().map_err(unavailable)?;
        replay.offset += line.len() as u64;
        replay.apply(op)?;
    }
    Ok(out)
}

/// Applies every complete line past `replay.offset`.
fn catch_up(replay: &mut Replay, file: &mut File, truncate_torn_tail: bool) -> Result<()> {
    file.seek(SeekFrom::Start(replay.offset))
        .map_err(unavailable)?;
    let mut reader = BufReader::new(&*file);
    let mut buf = String::new();
    loop {
        buf.clear();
        let n = reader.read_line(&mut buf).map_err(unavailable)?;
        if n == 0 {
            break;
        }
        if !buf.ends_with('\n') {
            if truncate_torn_tail {
                file.set_len(replay.offset).map_err(unavailable)?;
                trace_info!(offset = replay.offset, "truncated torn journal line");
            }
            break;
        }
        let line = buf.trim();
        if !line.is_empty() {
            let op: JournalOp = serde_json::from_str(line)
                .map_err(|e| corrupt(format!("line at byte {}: {e}", replay.offset)))?;
            replay.apply(op)?;
        }
        replay.offset += n as u64;
    }
    Ok(())
}

fn decode_outcome(
    state: TrialState,
    value: Option<String>,
    fail_reason: Option<String>,
) -> Result<Outcome> {
    match state {
        TrialState::Complete => {
            let value = value
                .ok_or_else(|| corrupt("complete trial without value".to_owned()))?
                .parse::<f64>()
                .map_err(|e| corrupt(e.to_string()))?;
            Ok(Outcome::Complete(value))
        }
        TrialState::Failed => Ok(Outcome::Failed(fail_reason.unwrap_or_default())),
        TrialState::Pruned => Ok(Outcome::Pruned),
        TrialState::Running => Err(corrupt("finish_trial into RUNNING".to_owned())),
    }
}

fn unavailable(e: std::io::Error) -> Error {
    Error::StorageUnavailable(e.to_string())
}

fn corrupt(msg: String) -> Error {
    Error::CorruptStorage(msg)
}

impl Storage for JournalStorage {
    fn create_study(&self, name: &str, direction: Direction) -> Result<StudyId> {
        self.write(|replay| {
            if replay.studies.iter().any(|s| s.name == name) {
                return Err(Error::DuplicateStudy(name.to_owned()));
            }
            let study_id = replay.studies.len() as StudyId;
            let op = JournalOp::CreateStudy {
                study_id,
                name: name.to_owned(),
                direction,
            };
            Ok((study_id, Some(op)))
        })
    }

    fn study_id(&self, name: &str) -> Result<StudyId> {
        self.read(|replay| {
            replay
                .studies
                .iter()
                .position(|s| s.name == name)
                .map(|idx| idx as StudyId)
                .ok_or_else(|| Error::StudyNotFound(name.to_owned()))
        })
    }

    fn study_direction(&self, study: StudyId) -> Result<Direction> {
        self.read(|replay| Ok(replay.study(study)?.direction))
    }

    fn studies(&self) -> Result<Vec<StudyInfo>> {
        self.read(|replay| {
            Ok(replay
                .studies
                .iter()
                .enumerate()
                .map(|(idx, s)| StudyInfo {
                    id: idx as StudyId,
                    name: s.name.clone(),
                    direction: s.direction,
                })
                .collect())
        })
    }

    fn create_trial_bounded(&self, study: StudyId, limit: usize) -> Result<Option<u64>> {
        self.write(|replay| {
            let entry = replay.study(study)?;
            if entry.trials.len() >= limit {
                return Ok((None, None));
            }
            let number = entry.trials.len() as u64;
            let op = JournalOp::CreateTrial {
                study_id: study,
                number,
                created_at: Utc::now(),
            };
            Ok((Some(number), Some(op)))
        })
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
        self.write(|replay| {
            let trial = replay.trial(study, number)?;
            trial.ensure_running("suggest")?;
            if let Some(existing) = trial.lookup_param(name, distribution)? {
                return Ok((existing, None));
            }
            let op = JournalOp::SetParam {
                study_id: study,
                number,
                name: name.to_owned(),
                distribution: distribution.clone(),
                value: value.clone(),
            };
            Ok((value, Some(op)))
        })
    }

    fn finish_trial(&self, study: StudyId, number: u64, outcome: Outcome) -> Result<TrialRecord> {
        self.write(|replay| {
            let mut finished = replay.trial(study, number)?.clone();
            let completed_at = Utc::now();
            finished.finish(outcome, completed_at)?;
            let op = JournalOp::FinishTrial {
                study_id: study,
                number,
                state: finished.state,
                value: finished.value.map(|v| v.to_string()),
                fail_reason: finished.fail_reason.clone(),
                completed_at,
            };
            Ok((finished, Some(op)))
        })
    }

    fn trial(&self, study: StudyId, number: u64) -> Result<TrialRecord> {
        self.read(|replay| replay.trial(study, number).cloned())
    }

    fn trials(&self, study: StudyId, states: Option<&[TrialState]>) -> Result<Vec<TrialRecord>> {
        self.read(|replay| {
            Ok(replay
                .study(study)?
                .trials
                .iter()
                .filter(|t| state_matches(states, t.state))
                .cloned()
                .collect())
        })
    }

    fn n_trials(&self, study: StudyId) -> Result<usize> {
        self.read(|replay| Ok(replay.study(study)?.trials.len()))
    }
}
