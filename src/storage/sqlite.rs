//! `SQLite`-backed storage backend for multi-process optimization.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};

use super::{StudyInfo, Storage, check_param, state_matches};
use crate::distribution::Distribution;
use crate::error::{Error, Result};
use crate::param::ParamValue;
use crate::record::{Outcome, TrialRecord};
use crate::types::{Direction, StudyId, TrialState};

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS studies (
    study_id  INTEGER PRIMARY KEY,
    name      TEXT NOT NULL UNIQUE,
    direction TEXT NOT NULL,
    next_trial_number INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS trials (
    study_id     INTEGER NOT NULL REFERENCES studies(study_id),
    number       INTEGER NOT NULL,
    state        TEXT NOT NULL,
    value        REAL,
    fail_reason  TEXT,
    created_at   TEXT NOT NULL,
    completed_at TEXT,
    PRIMARY KEY (study_id, number)
);
CREATE TABLE IF NOT EXISTS trial_params (
    study_id     INTEGER NOT NULL,
    number       INTEGER NOT NULL,
    name         TEXT NOT NULL,
    distribution TEXT NOT NULL,
    value        TEXT NOT NULL,
    PRIMARY KEY (study_id, number, name)
);";

/// A storage backend that keeps studies in a `SQLite` database.
///
/// Every mutation runs in its own `BEGIN IMMEDIATE` transaction, which takes
/// the database write lock before the first read. Reading a study's
/// `next_trial_number` and inserting that trial therefore cannot
/// interleave with another writer, whether that writer is a thread or a
/// separate process. WAL mode keeps readers from blocking the writer.
///
/// When another process holds the write lock for longer than the busy
/// timeout, the call fails with
/// [`Error::StorageUnavailable`](crate::Error::StorageUnavailable), which
/// the driver retries.
///
/// # Examples
///
/// ```no_run
/// use study_coordinator::storage::SqliteStorage;
///
/// let storage = SqliteStorage::new("studies.db").unwrap();
/// ```
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens (or creates) the database at `path` with a 5 second busy
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the database cannot be
    /// opened or the schema cannot be created.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_busy_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Opens (or creates) the database at `path`, waiting up to `timeout`
    /// for the write lock before reporting the store unavailable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the database cannot be
    /// opened or the schema cannot be created.
    pub fn with_busy_timeout(path: impl AsRef<Path>, timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path).map_err(db)?;
        conn.busy_timeout(timeout).map_err(db)?;
        // WAL mode: concurrent readers, single writer.
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(db)?;
        conn.execute_batch(SCHEMA).map_err(db)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn immediate<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db)?;
        let out = f(&tx)?;
        tx.commit().map_err(db)?;
        Ok(out)
    }

    fn deferred<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db)?;
        f(&tx)
    }
}

fn db(e: rusqlite::Error) -> Error {
    Error::StorageUnavailable(e.to_string())
}

fn corrupt(e: impl std::fmt::Display) -> Error {
    Error::CorruptStorage(e.to_string())
}

fn sql_int(v: u64) -> Result<i64> {
    i64::try_from(v).map_err(|_| Error::Internal("identifier exceeds i64"))
}

fn from_sql_int(v: i64) -> Result<u64> {
    u64::try_from(v).map_err(|_| corrupt(format!("negative identifier {v}")))
}

fn direction_of(tx: &Transaction<'_>, study: StudyId) -> Result<Direction> {
    let direction: Option<String> = tx
        .query_row(
            "SELECT direction FROM studies WHERE study_id = ?1",
            params![sql_int(study)?],
            |row| row.get(0),
        )
        .optional()
        .map_err(db)?;
    direction
        .ok_or_else(|| Error::StudyNotFound(format!("#{study}")))?
        .parse()
}

/// Loads the trials of `study`, or only trial `number` when given.
fn load_trials(tx: &Transaction<'_>, study: StudyId, number: Option<u64>) -> Result<Vec<TrialRecord>> {
    let study_key = sql_int(study)?;
    let number_key = number.map(sql_int).transpose()?;

    let mut stmt = tx
        .prepare(
            "SELECT number, state, value, fail_reason, created_at, completed_at
             FROM trials
             WHERE study_id = ?1 AND (?2 IS NULL OR number = ?2)
             ORDER BY number",
        )
        .map_err(db)?;
    let rows = stmt
        .query_map(params![study_key, number_key], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<f64>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, DateTime<Utc>>(4)?,
                row.get::<_, Option<DateTime<Utc>>>(5)?,
            ))
        })
        .map_err(db)?;

    let mut trials = Vec::new();
    for row in rows {
        let (number, state, value, fail_reason, created_at, completed_at) = row.map_err(db)?;
        let mut record = TrialRecord::new(from_sql_int(number)?, created_at);
        record.state = state.parse::<TrialState>()?;
        record.value = value;
        record.fail_reason = fail_reason;
        record.completed_at = completed_at;
        trials.push(record);
    }

    let mut stmt = tx
        .prepare(
            "SELECT number, name, distribution, value
             FROM trial_params
             WHERE study_id = ?1 AND (?2 IS NULL OR number = ?2)",
        )
        .map_err(db)?;
    let rows = stmt
        .query_map(params![study_key, number_key], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .map_err(db)?;

    let mut by_number: BTreeMap<u64, usize> = BTreeMap::new();
    for (idx, t) in trials.iter().enumerate() {
        by_number.insert(t.number, idx);
    }
    for row in rows {
        let (number, name, distribution, value) = row.map_err(db)?;
        let number = from_sql_int(number)?;
        let idx = *by_number
            .get(&number)
            .ok_or_else(|| corrupt(format!("parameter {name:?} of missing trial {number}")))?;
        let distribution: Distribution = serde_json::from_str(&distribution).map_err(corrupt)?;
        let value: ParamValue = serde_json::from_str(&value).map_err(corrupt)?;
        trials[idx].distributions.insert(name.clone(), distribution);
        trials[idx].params.insert(name, value);
    }

    Ok(trials)
}

fn load_trial(tx: &Transaction<'_>, study: StudyId, number: u64) -> Result<TrialRecord> {
    direction_of(tx, study)?;
    load_trials(tx, study, Some(number))?
        .pop()
        .ok_or(Error::TrialNotFound(number))
}

impl Storage for SqliteStorage {
    fn create_study(&self, name: &str, direction: Direction) -> Result<StudyId> {
        self.immediate(|tx| {
            let taken: Option<i64> = tx
                .query_row(
                    "SELECT study_id FROM studies WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db)?;
            if taken.is_some() {
                return Err(Error::DuplicateStudy(name.to_owned()));
            }
            let count: i64 = tx
                .query_row("SELECT COUNT(*) FROM studies", [], |row| row.get(0))
                .map_err(db)?;
            tx.execute(
                "INSERT INTO studies (study_id, name, direction) VALUES (?1, ?2, ?3)",
                params![count, name, direction.as_str()],
            )
            .map_err(db)?;
            trace_info!(study = name, id = count, "sqlite study created");
            from_sql_int(count)
        })
    }

    fn study_id(&self, name: &str) -> Result<StudyId> {
        self.deferred(|tx| {
            let id: Option<i64> = tx
                .query_row(
                    "SELECT study_id FROM studies WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db)?;
            from_sql_int(id.ok_or_else(|| Error::StudyNotFound(name.to_owned()))?)
        })
    }

    fn study_direction(&self, study: StudyId) -> Result<Direction> {
        self.deferred(|tx| direction_of(tx, study))
    }

    fn studies(&self) -> Result<Vec<StudyInfo>> {
        self.deferred(|tx| {
            let mut stmt = tx
                .prepare("SELECT study_id, name, direction FROM studies ORDER BY study_id")
                .map_err(db)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })
                .map_err(db)?;
            let mut studies = Vec::new();
            for row in rows {
                let (id, name, direction) = row.map_err(db)?;
                studies.push(StudyInfo {
                    id: from_sql_int(id)?,
                    name,
                    direction: direction.parse()?,
                });
            }
            Ok(studies)
        })
    }

    fn create_trial_bounded(&self, study: StudyId, limit: usize) -> Result<Option<u64>> {
        self.immediate(|tx| {
            let next: Option<i64> = tx
                .query_row(
                    "SELECT next_trial_number FROM studies WHERE study_id = ?1",
                    params![sql_int(study)?],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db)?;
            let next = next.ok_or_else(|| Error::StudyNotFound(format!("#{study}")))?;
            let number = from_sql_int(next)?;
            if usize::try_from(number).is_ok_and(|n| n >= limit) {
                return Ok(None);
            }
            tx.execute(
                "INSERT INTO trials (study_id, number, state, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    sql_int(study)?,
                    next,
                    TrialState::Running.as_str(),
                    Utc::now()
                ],
            )
            .map_err(db)?;
            tx.execute(
                "UPDATE studies SET next_trial_number = ?2 WHERE study_id = ?1",
                params![sql_int(study)?, next + 1],
            )
            .map_err(db)?;
            trace_debug!(study, number, "sqlite trial created");
            Ok(Some(number))
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
        self.immediate(|tx| {
            let trial = load_trial(tx, study, number)?;
            trial.ensure_running("suggest")?;
            if let Some(existing) = trial.lookup_param(name, distribution)? {
                return Ok(existing);
            }
            let encoded_distribution = serde_json::to_string(distribution).map_err(corrupt)?;
            let encoded_value = serde_json::to_string(&value).map_err(corrupt)?;
            tx.execute(
                "INSERT INTO trial_params (study_id, number, name, distribution, value)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    sql_int(study)?,
                    sql_int(number)?,
                    name,
                    encoded_distribution,
                    encoded_value
                ],
            )
            .map_err(db)?;
            Ok(value)
        })
    }

    fn finish_trial(&self, study: StudyId, number: u64, outcome: Outcome) -> Result<TrialRecord> {
        self.immediate(|tx| {
            let mut trial = load_trial(tx, study, number)?;
            trial.finish(outcome, Utc::now())?;
            tx.execute(
                "UPDATE trials
                 SET state = ?3, value = ?4, fail_reason = ?5, completed_at = ?6
                 WHERE study_id = ?1 AND number = ?2",
                params![
                    sql_int(study)?,
                    sql_int(number)?,
                    trial.state.as_str(),
                    trial.value,
                    trial.fail_reason,
                    trial.completed_at
                ],
            )
            .map_err(db)?;
            Ok(trial)
        })
    }

    fn trial(&self, study: StudyId, number: u64) -> Result<TrialRecord> {
        self.deferred(|tx| load_trial(tx, study, number))
    }

    fn trials(&self, study: StudyId, states: Option<&[TrialState]>) -> Result<Vec<TrialRecord>> {
        self.deferred(|tx| {
            direction_of(tx, study)?;
            let mut trials = load_trials(tx, study, None)?;
            trials.retain(|t| state_matches(states, t.state));
            Ok(trials)
        })
    }

    fn n_trials(&self, study: StudyId) -> Result<usize> {
        self.deferred(|tx| {
            let next: Option<i64> = tx
                .query_row(
                    "SELECT next_trial_number FROM studies WHERE study_id = ?1",
                    params![sql_int(study)?],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db)?;
            let next = next.ok_or_else(|| Error::StudyNotFound(format!("#{study}")))?;
            usize::try_from(next).map_err(corrupt)
        })
    }
}
