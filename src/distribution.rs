//! Parameter distribution types.
//!
//! A [`Distribution`] is the search-space descriptor recorded next to every
//! suggested value. Two requests for the same parameter within one trial
//! must carry structurally equal descriptors.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::param::ParamValue;

/// Relative tolerance used when checking float values against a step grid.
const GRID_TOLERANCE: f64 = 1e-9;

/// Number of `step`s from `low` to `v`.
///
/// Falls back to dividing each bound separately when `v - low` overflows,
/// which happens for spans wider than `f64::MAX`.
pub(crate) fn steps_between(low: f64, v: f64, step: f64) -> f64 {
    let span = v - low;
    if span.is_finite() {
        span / step
    } else {
        v / step - low / step
    }
}

/// Distribution for integer parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IntDistribution {
    /// Lower bound (inclusive).
    pub low: i64,
    /// Upper bound (inclusive).
    pub high: i64,
    /// Step between admissible values.
    pub step: i64,
    /// Whether to sample in log space.
    pub log: bool,
}

/// Distribution for floating-point parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FloatDistribution {
    /// Lower bound (inclusive).
    pub low: f64,
    /// Upper bound (inclusive).
    pub high: f64,
    /// Optional step size for discretization.
    pub step: Option<f64>,
    /// Whether to sample in log space.
    pub log: bool,
}

/// Distribution for categorical parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CategoricalDistribution {
    /// The admissible values, in declaration order.
    pub choices: Vec<ParamValue>,
}

/// Enum wrapping all parameter distribution types.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Distribution {
    /// An inclusive integer range.
    Int(IntDistribution),
    /// A floating-point range.
    Float(FloatDistribution),
    /// A finite set of choices.
    Categorical(CategoricalDistribution),
}

impl Distribution {
    /// An integer range `[low, high]` with unit step.
    #[must_use]
    pub fn int(low: i64, high: i64) -> Self {
        Distribution::Int(IntDistribution {
            low,
            high,
            step: 1,
            log: false,
        })
    }

    /// A float range `[low, high]`.
    #[must_use]
    pub fn float(low: f64, high: f64) -> Self {
        Distribution::Float(FloatDistribution {
            low,
            high,
            step: None,
            log: false,
        })
    }

    /// A categorical distribution over `choices`.
    #[must_use]
    pub fn categorical<T: Into<ParamValue>>(choices: impl IntoIterator<Item = T>) -> Self {
        Distribution::Categorical(CategoricalDistribution {
            choices: choices.into_iter().map(Into::into).collect(),
        })
    }

    /// Checks that the descriptor can be sampled from.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBounds`], [`Error::InvalidLogBounds`],
    /// [`Error::InvalidStep`], [`Error::EmptyChoices`] or
    /// [`Error::NonFiniteChoice`].
    #[allow(clippy::cast_precision_loss)]
    pub fn validate(&self) -> Result<()> {
        match self {
            Distribution::Int(d) => {
                if d.low > d.high {
                    return Err(Error::InvalidBounds {
                        low: d.low as f64,
                        high: d.high as f64,
                    });
                }
                if d.step <= 0 {
                    return Err(Error::InvalidStep("step must be positive"));
                }
                if d.log && d.step != 1 {
                    return Err(Error::InvalidStep("step cannot be combined with log scale"));
                }
                if d.log && d.low < 1 {
                    return Err(Error::InvalidLogBounds);
                }
            }
            Distribution::Float(d) => {
                if !d.low.is_finite() || !d.high.is_finite() || d.low > d.high {
                    return Err(Error::InvalidBounds {
                        low: d.low,
                        high: d.high,
                    });
                }
                if let Some(step) = d.step {
                    if !(step.is_finite() && step > 0.0) {
                        return Err(Error::InvalidStep("step must be positive"));
                    }
                    if d.log {
                        return Err(Error::InvalidStep("step cannot be combined with log scale"));
                    }
                }
                if d.log && d.low <= 0.0 {
                    return Err(Error::InvalidLogBounds);
                }
            }
            Distribution::Categorical(d) => {
                if d.choices.is_empty() {
                    return Err(Error::EmptyChoices);
                }
                if let Some(v) = d.choices.iter().find_map(|c| match c {
                    ParamValue::Float(v) if !v.is_finite() => Some(*v),
                    _ => None,
                }) {
                    return Err(Error::NonFiniteChoice(v));
                }
            }
        }
        Ok(())
    }

    /// Returns `true` if `value` could have been drawn from this distribution.
    #[must_use]
    pub fn contains(&self, value: &ParamValue) -> bool {
        match (self, value) {
            (Distribution::Int(d), ParamValue::Int(v)) => {
                (d.low..=d.high).contains(v)
                    && (i128::from(*v) - i128::from(d.low)) % i128::from(d.step) == 0
            }
            (Distribution::Float(d), ParamValue::Float(v)) => {
                if !(d.low..=d.high).contains(v) {
                    return false;
                }
                d.step.is_none_or(|step| {
                    let k = steps_between(d.low, *v, step);
                    (k - k.round()).abs() <= GRID_TOLERANCE * k.abs().max(1.0)
                })
            }
            (Distribution::Categorical(d), v) => d.choices.contains(v),
            _ => false,
        }
    }

    /// Returns a short name for the kind of distribution.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Distribution::Int(_) => "IntRange",
            Distribution::Float(_) => "FloatRange",
            Distribution::Categorical(_) => "Categorical",
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distribution::Int(d) => {
                write!(f, "IntRange[{}, {}]", d.low, d.high)?;
                if d.step != 1 {
                    write!(f, " step {}", d.step)?;
                }
                if d.log {
                    f.write_str(" log")?;
                }
                Ok(())
            }
            Distribution::Float(d) => {
                write!(f, "FloatRange[{}, {}]", d.low, d.high)?;
                if let Some(step) = d.step {
                    write!(f, " step {step}")?;
                }
                if d.log {
                    f.write_str(" log")?;
                }
                Ok(())
            }
            Distribution::Categorical(d) => {
                f.write_str("Categorical{")?;
                for (i, choice) in d.choices.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{choice}")?;
                }
                f.write_str("}")
            }
        }
    }
}
