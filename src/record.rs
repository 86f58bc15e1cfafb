//! Trial records and the trial state machine.
//!
//! A [`TrialRecord`] is owned by a storage backend. Callers only ever see
//! clones, so a record they hold is a snapshot of a state the backend
//! actually reached. Every backend funnels its mutations through the
//! `pub(crate)` transition helpers below, which keeps the state machine in
//! one place:
//!
//! ```text
//! RUNNING ──finish(Complete(v))──▶ COMPLETE
//!    │    ──finish(Failed(msg))──▶ FAILED
//!    └────finish(Pruned)─────────▶ PRUNED
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::distribution::Distribution;
use crate::error::{Error, Result};
use crate::param::ParamValue;
use crate::parameter::Parameter;
use crate::types::TrialState;

/// How a trial ended.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Outcome {
    /// The objective returned a value.
    Complete(f64),
    /// The objective failed; the payload describes why.
    Failed(String),
    /// The trial was stopped early.
    Pruned,
}

impl Outcome {
    /// The terminal state this outcome leads to.
    #[must_use]
    pub fn state(&self) -> TrialState {
        match self {
            Outcome::Complete(_) => TrialState::Complete,
            Outcome::Failed(_) => TrialState::Failed,
            Outcome::Pruned => TrialState::Pruned,
        }
    }
}

/// One optimization attempt, as recorded by the coordinator.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrialRecord {
    /// Dense, zero-based number within the study.
    pub number: u64,
    /// Current lifecycle state.
    pub state: TrialState,
    /// Suggested values, keyed by parameter name.
    pub params: BTreeMap<String, ParamValue>,
    /// The distribution each parameter was suggested from.
    pub distributions: BTreeMap<String, Distribution>,
    /// The objective value; set only for `Complete` trials.
    pub value: Option<f64>,
    /// Error payload of a `Failed` trial.
    pub fail_reason: Option<String>,
    /// When the trial was created.
    pub created_at: DateTime<Utc>,
    /// When the trial reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

impl TrialRecord {
    /// Creates a fresh `Running` record.
    pub(crate) fn new(number: u64, created_at: DateTime<Utc>) -> Self {
        Self {
            number,
            state: TrialState::Running,
            params: BTreeMap::new(),
            distributions: BTreeMap::new(),
            value: None,
            fail_reason: None,
            created_at,
            completed_at: None,
        }
    }

    /// Returns `true` once the trial reached a terminal state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    /// Returns the raw value suggested for `name`.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    /// Returns the typed value for the given parameter.
    ///
    /// Returns `None` if the parameter was not suggested in this trial or
    /// its stored value does not fit the parameter's type.
    pub fn get<P: Parameter>(&self, param: &P) -> Option<P::Value> {
        self.params
            .get(param.name())
            .and_then(|v| param.cast_param_value(v).ok())
    }

    /// Wall-clock time between creation and the terminal transition.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|end| end - self.created_at)
    }

    /// Fails with [`Error::InvalidTrialState`] unless the trial is running.
    pub(crate) fn ensure_running(&self, operation: &'static str) -> Result<()> {
        if self.state == TrialState::Running {
            Ok(())
        } else {
            Err(Error::InvalidTrialState {
                number: self.number,
                state: self.state,
                operation,
            })
        }
    }

    /// Looks up a previously suggested value.
    ///
    /// Returns `Ok(None)` when `name` has not been suggested yet, and
    /// [`Error::DistributionMismatch`] when it was suggested under a
    /// different distribution.
    pub(crate) fn lookup_param(
        &self,
        name: &str,
        distribution: &Distribution,
    ) -> Result<Option<ParamValue>> {
        let Some(recorded) = self.distributions.get(name) else {
            return Ok(None);
        };
        if recorded != distribution {
            return Err(Error::DistributionMismatch {
                name: name.to_owned(),
                recorded: recorded.to_string(),
                requested: distribution.to_string(),
            });
        }
        self.params
            .get(name)
            .cloned()
            .map(Some)
            .ok_or(Error::Internal("distribution recorded without a value"))
    }

    /// Records `value` for `name` unless a value is already present.
    ///
    /// Returns the value that ends up stored, which is the earlier one when
    /// the parameter already existed.
    pub(crate) fn record_param(
        &mut self,
        name: &str,
        distribution: &Distribution,
        value: ParamValue,
    ) -> Result<ParamValue> {
        self.ensure_running("suggest")?;
        if let Some(existing) = self.lookup_param(name, distribution)? {
            return Ok(existing);
        }
        self.distributions
            .insert(name.to_owned(), distribution.clone());
        self.params.insert(name.to_owned(), value.clone());
        Ok(value)
    }

    /// Moves the trial into the terminal state described by `outcome`.
    pub(crate) fn finish(&mut self, outcome: Outcome, now: DateTime<Utc>) -> Result<()> {
        self.ensure_running("finalize")?;
        if let Outcome::Complete(v) = outcome
            && v.is_nan()
        {
            return Err(Error::NanValue);
        }
        self.state = outcome.state();
        match outcome {
            Outcome::Complete(v) => self.value = Some(v),
            Outcome::Failed(reason) => self.fail_reason = Some(reason),
            Outcome::Pruned => {}
        }
        self.completed_at = Some(now);
        Ok(())
    }
}
