//! Random sampler implementation.

use crate::distribution::{Distribution, steps_between};
use crate::param::ParamValue;
use crate::record::TrialRecord;
use crate::rng_util;
use crate::sampler::Sampler;

/// A sampler that draws independently and uniformly from distributions.
///
/// This sampler ignores the trial history, respecting log scale and step
/// size constraints. It keeps no mutable state: an unseeded sampler draws
/// fresh entropy per call, and a seeded one derives a dedicated stream from
/// `(seed, trial_number, param_name)`. A seeded sampler therefore suggests
/// the same value for the same trial and parameter in every process.
///
/// # Examples
///
/// ```
/// use study_coordinator::sampler::RandomSampler;
///
/// // Create with default RNG
/// let sampler = RandomSampler::new();
///
/// // Create with a fixed seed for reproducibility
/// let sampler = RandomSampler::with_seed(42);
/// ```
#[derive(Clone, Debug, Default)]
pub struct RandomSampler {
    seed: Option<u64>,
}

impl RandomSampler {
    /// Creates a new random sampler with a default random seed.
    #[must_use]
    pub fn new() -> Self {
        Self { seed: None }
    }

    /// Creates a new random sampler with a fixed seed for reproducibility.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }

    fn rng(&self, trial_number: u64, param_name: &str) -> fastrand::Rng {
        match self.seed {
            Some(seed) => {
                fastrand::Rng::with_seed(rng_util::stream_seed(seed, trial_number, param_name))
            }
            None => fastrand::Rng::new(),
        }
    }
}

impl Sampler for RandomSampler {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    fn sample(
        &self,
        param_name: &str,
        distribution: &Distribution,
        trial_number: u64,
        _history: &[TrialRecord],
    ) -> ParamValue {
        let mut rng = self.rng(trial_number, param_name);

        match distribution {
            Distribution::Float(d) => {
                let value = if d.log {
                    // Sample uniformly in log space
                    let log_value = rng_util::f64_range(&mut rng, d.low.ln(), d.high.ln());
                    log_value.exp()
                } else if let Some(step) = d.step {
                    // Sample from step grid
                    let n_steps = steps_between(d.low, d.high, step).floor() as i64;
                    let k = rng.i64(0..=n_steps);
                    grid_point(d.low, k as f64, step)
                } else {
                    rng_util::f64_range(&mut rng, d.low, d.high)
                };
                // Rounding in exp/mul can step just past a bound.
                ParamValue::Float(value.clamp(d.low, d.high))
            }
            Distribution::Int(d) => {
                let value = if d.log {
                    let log_low = (d.low as f64).ln();
                    let log_high = (d.high as f64).ln();
                    let log_value = rng_util::f64_range(&mut rng, log_low, log_high);
                    (log_value.exp().round() as i64).clamp(d.low, d.high)
                } else {
                    // The span of a full i64 range only fits in 128 bits.
                    let n_steps = (i128::from(d.high) - i128::from(d.low)) / i128::from(d.step);
                    let k = rng.u64(0..=n_steps as u64);
                    (i128::from(d.low) + i128::from(k) * i128::from(d.step)) as i64
                };
                ParamValue::Int(value)
            }
            Distribution::Categorical(d) => {
                let index = rng.usize(0..d.choices.len());
                d.choices[index].clone()
            }
        }
    }
}

/// The `k`-th point of the grid starting at `low`.
fn grid_point(low: f64, k: f64, step: f64) -> f64 {
    let v = low + k * step;
    if v.is_finite() { v } else { (low / step + k) * step }
}
