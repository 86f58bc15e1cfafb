//! Typed parameter definitions.
//!
//! The [`Parameter`] trait gives a parameter a name, a [`Distribution`] and
//! a way to turn the raw [`ParamValue`] the study stored back into a typed
//! value. Built-in implementations cover floats, integers, categoricals and
//! booleans.
//!
//! # Example
//!
//! ```
//! use study_coordinator::parameter::{BoolParam, FloatParam, IntParam, Parameter};
//! use study_coordinator::{Direction, Study};
//!
//! let study = Study::new(Direction::Minimize);
//! let mut trial = study.ask().unwrap();
//!
//! let lr = FloatParam::new("lr", 1e-5, 1e-1)
//!     .log_scale()
//!     .suggest(&mut trial)
//!     .unwrap();
//! let layers = IntParam::new("layers", 1, 10).suggest(&mut trial).unwrap();
//! let dropout = BoolParam::new("dropout").suggest(&mut trial).unwrap();
//! ```

use core::fmt::Debug;

use crate::distribution::{
    CategoricalDistribution, Distribution, FloatDistribution, IntDistribution,
};
use crate::error::{Error, Result};
use crate::param::ParamValue;
use crate::trial::Trial;

/// A trait for defining parameter types that can be suggested by a [`Trial`].
///
/// Implementors specify the distribution to sample from and how to convert
/// the raw [`ParamValue`] back into a typed value.
pub trait Parameter: Debug {
    /// The typed value returned after sampling.
    type Value;

    /// The name the value is recorded under.
    fn name(&self) -> &str;

    /// Returns the distribution that this parameter samples from.
    fn distribution(&self) -> Distribution;

    /// Converts a raw [`ParamValue`] into the typed value.
    ///
    /// # Errors
    ///
    /// Returns an error if the `ParamValue` variant doesn't match what this parameter expects.
    fn cast_param_value(&self, param_value: &ParamValue) -> Result<Self::Value>;

    /// Validates the parameter configuration.
    ///
    /// Called before sampling. The default implementation validates the
    /// distribution.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameter configuration is invalid.
    fn validate(&self) -> Result<()> {
        self.distribution().validate()
    }

    /// Suggests a value for this parameter from the given trial.
    ///
    /// This is a convenience method that delegates to [`Trial::suggest_param`].
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails, the name was already suggested
    /// in this trial under a different distribution, or the store fails.
    fn suggest(&self, trial: &mut Trial<'_>) -> Result<Self::Value>
    where
        Self: Sized,
    {
        trial.suggest_param(self)
    }
}

/// A floating-point parameter with optional log-scale and step size.
///
/// # Example
///
/// ```
/// use study_coordinator::parameter::{FloatParam, Parameter};
/// use study_coordinator::{Direction, Study};
///
/// let study = Study::new(Direction::Minimize);
/// let mut trial = study.ask().unwrap();
///
/// // Simple range
/// let x = FloatParam::new("x", 0.0, 1.0).suggest(&mut trial).unwrap();
///
/// // Log-scale
/// let lr = FloatParam::new("lr", 1e-5, 1e-1)
///     .log_scale()
///     .suggest(&mut trial)
///     .unwrap();
///
/// // Stepped
/// let step = FloatParam::new("step", 0.0, 1.0)
///     .step(0.25)
///     .suggest(&mut trial)
///     .unwrap();
/// ```
#[derive(Clone, Debug)]
pub struct FloatParam {
    name: String,
    low: f64,
    high: f64,
    log_scale: bool,
    step: Option<f64>,
}

impl FloatParam {
    /// Creates a new float parameter with the given bounds.
    #[must_use]
    pub fn new(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            low,
            high,
            log_scale: false,
            step: None,
        }
    }

    /// Enables log-scale sampling.
    #[must_use]
    pub fn log_scale(mut self) -> Self {
        self.log_scale = true;
        self
    }

    /// Sets a step size for discretized sampling.
    #[must_use]
    pub fn step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }
}

impl Parameter for FloatParam {
    type Value = f64;

    fn name(&self) -> &str {
        &self.name
    }

    fn distribution(&self) -> Distribution {
        Distribution::Float(FloatDistribution {
            low: self.low,
            high: self.high,
            step: self.step,
            log: self.log_scale,
        })
    }

    fn cast_param_value(&self, param_value: &ParamValue) -> Result<f64> {
        param_value
            .as_float()
            .ok_or(Error::Internal("Float distribution should return Float value"))
    }
}

/// An integer parameter with optional log-scale and step size.
///
/// # Example
///
/// ```
/// use study_coordinator::parameter::{IntParam, Parameter};
/// use study_coordinator::{Direction, Study};
///
/// let study = Study::new(Direction::Minimize);
/// let mut trial = study.ask().unwrap();
///
/// let n = IntParam::new("n", 1, 10).suggest(&mut trial).unwrap();
/// let batch = IntParam::new("batch", 1, 1024)
///     .log_scale()
///     .suggest(&mut trial)
///     .unwrap();
/// let units = IntParam::new("units", 32, 512)
///     .step(32)
///     .suggest(&mut trial)
///     .unwrap();
/// ```
#[derive(Clone, Debug)]
pub struct IntParam {
    name: String,
    low: i64,
    high: i64,
    log_scale: bool,
    step: i64,
}

impl IntParam {
    /// Creates a new integer parameter with the given bounds.
    #[must_use]
    pub fn new(name: impl Into<String>, low: i64, high: i64) -> Self {
        Self {
            name: name.into(),
            low,
            high,
            log_scale: false,
            step: 1,
        }
    }

    /// Enables log-scale sampling.
    #[must_use]
    pub fn log_scale(mut self) -> Self {
        self.log_scale = true;
        self
    }

    /// Sets a step size for discretized sampling.
    #[must_use]
    pub fn step(mut self, step: i64) -> Self {
        self.step = step;
        self
    }
}

impl Parameter for IntParam {
    type Value = i64;

    fn name(&self) -> &str {
        &self.name
    }

    fn distribution(&self) -> Distribution {
        Distribution::Int(IntDistribution {
            low: self.low,
            high: self.high,
            step: self.step,
            log: self.log_scale,
        })
    }

    fn cast_param_value(&self, param_value: &ParamValue) -> Result<i64> {
        param_value
            .as_int()
            .ok_or(Error::Internal("Int distribution should return Int value"))
    }
}

/// A categorical parameter that selects from a list of choices.
///
/// # Example
///
/// ```
/// use study_coordinator::parameter::{CategoricalParam, Parameter};
/// use study_coordinator::{Direction, Study};
///
/// let study = Study::new(Direction::Minimize);
/// let mut trial = study.ask().unwrap();
/// let opt = CategoricalParam::new("optimizer", vec!["sgd", "adam", "rmsprop"])
///     .suggest(&mut trial)
///     .unwrap();
/// assert!(["sgd", "adam", "rmsprop"].contains(&opt));
/// ```
#[derive(Clone, Debug)]
pub struct CategoricalParam<T: Clone> {
    name: String,
    choices: Vec<T>,
}

impl<T: Clone> CategoricalParam<T> {
    /// Creates a new categorical parameter with the given choices.
    #[must_use]
    pub fn new(name: impl Into<String>, choices: Vec<T>) -> Self {
        Self {
            name: name.into(),
            choices,
        }
    }
}

impl<T: Clone + Debug + Into<ParamValue>> Parameter for CategoricalParam<T> {
    type Value = T;

    fn name(&self) -> &str {
        &self.name
    }

    fn distribution(&self) -> Distribution {
        Distribution::Categorical(CategoricalDistribution {
            choices: self.choices.iter().cloned().map(Into::into).collect(),
        })
    }

    fn cast_param_value(&self, param_value: &ParamValue) -> Result<T> {
        self.choices
            .iter()
            .find(|choice| Into::<ParamValue>::into((*choice).clone()) == *param_value)
            .cloned()
            .ok_or(Error::Internal(
                "Categorical value is not one of the choices",
            ))
    }
}

/// A boolean parameter (a categorical over `[false, true]`).
///
/// # Example
///
/// ```
/// use study_coordinator::parameter::{BoolParam, Parameter};
/// use study_coordinator::{Direction, Study};
///
/// let study = Study::new(Direction::Minimize);
/// let mut trial = study.ask().unwrap();
/// let dropout = BoolParam::new("dropout").suggest(&mut trial).unwrap();
/// ```
#[derive(Clone, Debug)]
pub struct BoolParam {
    name: String,
}

impl BoolParam {
    /// Creates a new boolean parameter.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Parameter for BoolParam {
    type Value = bool;

    fn name(&self) -> &str {
        &self.name
    }

    fn distribution(&self) -> Distribution {
        Distribution::categorical([false, true])
    }

    fn cast_param_value(&self, param_value: &ParamValue) -> Result<bool> {
        param_value
            .as_bool()
            .ok_or(Error::Internal("Bool parameter should return Bool value"))
    }
}
