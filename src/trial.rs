//! The parameter requester handed to objective functions.

use core::fmt::Debug;
use std::collections::BTreeMap;

use crate::distribution::{Distribution, FloatDistribution, IntDistribution};
use crate::driver::RetryPolicy;
use crate::error::Result;
use crate::param::ParamValue;
use crate::parameter::{CategoricalParam, Parameter};
use crate::record::TrialRecord;
use crate::study::Study;

/// A handle to one running trial.
///
/// A `Trial` holds no parameter state of its own: it is a study reference
/// plus a trial number, and every request goes through
/// [`Study::suggest`], so the storage backend stays the single owner of the
/// trial's record. Transient storage failures are retried according to the
/// trial's [`RetryPolicy`]; misuse errors are returned immediately.
///
/// # Examples
///
/// ```
/// use study_coordinator::{Direction, Study};
///
/// let study = Study::new(Direction::Minimize);
/// let mut trial = study.ask().unwrap();
/// let x = trial.suggest_float("x", 0.0, 1.0).unwrap();
/// // Re-requesting a parameter returns the recorded value.
/// assert_eq!(trial.suggest_float("x", 0.0, 1.0).unwrap(), x);
/// ```
pub struct Trial<'a> {
    study: &'a Study,
    number: u64,
    retry: RetryPolicy,
}

impl Debug for Trial<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Trial")
            .field("study", &self.study.name())
            .field("number", &self.number)
            .field("retry", &self.retry)
            .finish()
    }
}

impl<'a> Trial<'a> {
    pub(crate) fn new(study: &'a Study, number: u64, retry: RetryPolicy) -> Self {
        Self {
            study,
            number,
            retry,
        }
    }

    /// The trial number within its study.
    #[must_use]
    pub fn number(&self) -> u64 {
        self.number
    }

    /// The study this trial belongs to.
    #[must_use]
    pub fn study(&self) -> &'a Study {
        self.study
    }

    /// Requests a value for `name` drawn from `distribution`.
    ///
    /// Returns the recorded value when `name` was already suggested in this
    /// trial under an equal distribution.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DistributionMismatch`](crate::Error::DistributionMismatch),
    /// [`Error::InvalidTrialState`](crate::Error::InvalidTrialState), a
    /// validation error for `distribution`, or
    /// [`Error::StorageUnavailable`](crate::Error::StorageUnavailable) once
    /// the retries are exhausted.
    pub fn suggest(&mut self, name: &str, distribution: &Distribution) -> Result<ParamValue> {
        let (study, number) = (self.study, self.number);
        self.retry
            .run("suggest", || study.suggest(number, name, distribution))
    }

    /// Requests an integer in `[low, high]`.
    ///
    /// # Errors
    ///
    /// See [`suggest`](Self::suggest).
    pub fn suggest_int(&mut self, name: &str, low: i64, high: i64) -> Result<i64> {
        let distribution = Distribution::Int(IntDistribution {
            low,
            high,
            step: 1,
            log: false,
        });
        self.suggest(name, &distribution)?
            .as_int()
            .ok_or(crate::Error::Internal("Int distribution should return Int value"))
    }

    /// Requests a float in `[low, high]`.
    ///
    /// # Errors
    ///
    /// See [`suggest`](Self::suggest).
    pub fn suggest_float(&mut self, name: &str, low: f64, high: f64) -> Result<f64> {
        let distribution = Distribution::Float(FloatDistribution {
            low,
            high,
            step: None,
            log: false,
        });
        self.suggest(name, &distribution)?
            .as_float()
            .ok_or(crate::Error::Internal("Float distribution should return Float value"))
    }

    /// Requests one of `choices`.
    ///
    /// # Errors
    ///
    /// See [`suggest`](Self::suggest).
    pub fn suggest_categorical<T>(&mut self, name: &str, choices: &[T]) -> Result<T>
    where
        T: Clone + Debug + Into<ParamValue>,
    {
        self.suggest_param(&CategoricalParam::new(name, choices.to_vec()))
    }

    /// Requests a value for a typed [`Parameter`].
    ///
    /// # Errors
    ///
    /// Returns the parameter's validation error, or see
    /// [`suggest`](Self::suggest).
    pub fn suggest_param<P: Parameter>(&mut self, param: &P) -> Result<P::Value> {
        param.validate()?;
        let distribution = param.distribution();
        let value = self.suggest(param.name(), &distribution)?;
        param.cast_param_value(&value)
    }

    /// The parameters recorded for this trial so far.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the record cannot be read.
    pub fn params(&self) -> Result<BTreeMap<String, ParamValue>> {
        Ok(self.record()?.params)
    }

    /// A snapshot of this trial's record.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the record cannot be read.
    pub fn record(&self) -> Result<TrialRecord> {
        let (study, number) = (self.study, self.number);
        self.retry.run("read trial", || study.trial(number))
    }
}
