//! Core types for the coordinator.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of a study inside a storage backend.
pub type StudyId = u64;

/// The direction of optimization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Direction {
    /// Minimize the objective value.
    Minimize,
    /// Maximize the objective value.
    Maximize,
}

impl Direction {
    /// Returns `true` if `candidate` is strictly better than `incumbent`.
    #[must_use]
    pub fn is_better(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Direction::Minimize => candidate < incumbent,
            Direction::Maximize => candidate > incumbent,
        }
    }

    /// Returns the persisted name of the direction.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Minimize => "minimize",
            Direction::Maximize => "maximize",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "minimize" => Ok(Direction::Minimize),
            "maximize" => Ok(Direction::Maximize),
            _ => Err(crate::Error::CorruptStorage(format!(
                "unknown direction '{s}'"
            ))),
        }
    }
}

/// The state of a trial in its lifecycle.
///
/// `Running` is the only non-terminal state. A trial leaves it exactly once,
/// through [`Study::finalize`](crate::Study::finalize).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum TrialState {
    /// The trial is currently running.
    Running,
    /// The trial completed successfully and carries a value.
    Complete,
    /// The objective failed.
    Failed,
    /// The trial was stopped early.
    Pruned,
}

impl TrialState {
    /// Returns `true` for the terminal states.
    #[must_use]
    pub fn is_finished(self) -> bool {
        !matches!(self, TrialState::Running)
    }

    /// Returns the persisted name of the state.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TrialState::Running => "RUNNING",
            TrialState::Complete => "COMPLETE",
            TrialState::Failed => "FAILED",
            TrialState::Pruned => "PRUNED",
        }
    }
}

impl fmt::Display for TrialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrialState {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "RUNNING" => Ok(TrialState::Running),
            "COMPLETE" => Ok(TrialState::Complete),
            "FAILED" => Ok(TrialState::Failed),
            "PRUNED" => Ok(TrialState::Pruned),
            _ => Err(crate::Error::CorruptStorage(format!(
                "unknown trial state '{s}'"
            ))),
        }
    }
}
