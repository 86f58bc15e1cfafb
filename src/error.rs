use crate::types::TrialState;

/// Errors returned by the study coordinator and its storage backends.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when an operation is illegal for the trial's current state.
    #[error("cannot {operation} trial {number}: trial is {state}")]
    InvalidTrialState {
        /// The trial number.
        number: u64,
        /// The state the trial was found in.
        state: TrialState,
        /// The rejected operation.
        operation: &'static str,
    },

    /// Returned when a parameter is re-suggested within a trial under a
    /// different distribution.
    #[error("distribution mismatch for '{name}': recorded {recorded}, requested {requested}")]
    DistributionMismatch {
        /// The name of the conflicting parameter.
        name: String,
        /// The distribution the parameter was first suggested with.
        recorded: String,
        /// The distribution of the rejected request.
        requested: String,
    },

    /// Returned when requesting the best trial but no trials have completed.
    #[error("no completed trials available")]
    NoCompletedTrials,

    /// Returned when the backing store or transport cannot be reached.
    ///
    /// This is the only retryable error; see [`Error::is_retryable`].
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Returned when persisted data cannot be decoded or replayed.
    #[error("corrupt storage: {0}")]
    CorruptStorage(String),

    /// Returned when no study with the given name exists.
    #[error("study '{0}' not found")]
    StudyNotFound(String),

    /// Returned when creating a study whose name is already taken.
    #[error("study '{0}' already exists")]
    DuplicateStudy(String),

    /// Returned when the trial number is not known to the study.
    #[error("trial {0} not found")]
    TrialNotFound(u64),

    /// Returned when the lower bound is greater than the upper bound.
    #[error("invalid bounds: low ({low}) must be less than or equal to high ({high})")]
    InvalidBounds {
        /// The lower bound value.
        low: f64,
        /// The upper bound value.
        high: f64,
    },

    /// Returned when log scale is used with non-positive bounds.
    #[error("invalid log bounds: low must be positive for log scale")]
    InvalidLogBounds,

    /// Returned when a step is not positive or is combined with log scale.
    #[error("invalid step: {0}")]
    InvalidStep(&'static str),

    /// Returned when categorical choices are empty.
    #[error("categorical choices cannot be empty")]
    EmptyChoices,

    /// Returned when a categorical choice is an infinite or NaN float.
    #[error("categorical choice {0} is not a finite number")]
    NonFiniteChoice(f64),

    /// Returned when a trial is completed with a NaN value.
    #[error("objective value must not be NaN")]
    NanValue,

    /// Returned when a sampler produces a value outside the requested
    /// distribution.
    #[error("sampler produced {value} for '{name}', outside its distribution")]
    SamplerOutOfRange {
        /// The parameter name.
        name: String,
        /// The rejected value.
        value: String,
    },

    /// Returned by an objective to signal that its trial should be pruned.
    #[error("trial was pruned")]
    TrialPruned,

    /// Returned when a worker of the optimization pool dies.
    #[error("worker error: {0}")]
    Worker(String),

    /// Returned when an internal invariant is violated.
    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl Error {
    /// Returns `true` for transient failures that a driver may retry with
    /// backoff.
    ///
    /// Misuse errors such as [`Error::InvalidTrialState`] or
    /// [`Error::DistributionMismatch`] are never retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StorageUnavailable(_))
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// Convenience type for signalling a pruned trial from an objective function.
///
/// Implements `Into<Error>` so it can be used with `?` in objectives that
/// return `Result<f64, Error>`.
///
/// # Examples
///
/// ```
/// use study_coordinator::{Error, TrialPruned};
///
/// fn objective_that_prunes() -> Result<f64, Error> {
///     Err(TrialPruned)?
/// }
/// ```
#[derive(Debug)]
pub struct TrialPruned;

impl core::fmt::Display for TrialPruned {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "trial was pruned")
    }
}

impl From<TrialPruned> for Error {
    fn from(_: TrialPruned) -> Self {
        Error::TrialPruned
    }
}

/// Returns `true` if an objective error asks for the trial to be pruned.
///
/// Recognizes both [`Error::TrialPruned`] and the [`TrialPruned`] marker.
pub(crate) fn is_trial_pruned<E: 'static>(e: &E) -> bool {
    let any: &dyn core::any::Any = e;
    if let Some(err) = any.downcast_ref::<Error>() {
        matches!(err, Error::TrialPruned)
    } else {
        any.downcast_ref::<TrialPruned>().is_some()
    }
}
