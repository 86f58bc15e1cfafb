//! Sampler trait and implementations for parameter sampling.
//!
//! A sampler is a pure strategy: the coordinator hands it the distribution,
//! the trial being sampled and the full `COMPLETE` history on every call.
//! Anything a sampler wants to learn must be derived from that history, so
//! two processes sharing one study sample identically.

pub mod random;

pub use random::RandomSampler;

use crate::distribution::Distribution;
use crate::param::ParamValue;
use crate::record::TrialRecord;

/// Trait for pluggable parameter sampling strategies.
///
/// Implementations must return a value contained in `distribution`; the
/// coordinator rejects anything else with
/// [`Error::SamplerOutOfRange`](crate::Error::SamplerOutOfRange). The trait
/// requires `Send + Sync` because one sampler serves every worker thread.
pub trait Sampler: Send + Sync {
    /// Samples a value for `param_name` in trial `trial_number`.
    ///
    /// # Arguments
    ///
    /// * `param_name` - The name of the parameter being suggested.
    /// * `distribution` - The (validated) distribution to sample from.
    /// * `trial_number` - The trial the value is for.
    /// * `history` - All completed trials of the study, ordered by number.
    fn sample(
        &self,
        param_name: &str,
        distribution: &Distribution,
        trial_number: u64,
        history: &[TrialRecord],
    ) -> ParamValue;
}

impl<S: Sampler + ?Sized> Sampler for std::sync::Arc<S> {
    fn sample(
        &self,
        param_name: &str,
        distribution: &Distribution,
        trial_number: u64,
        history: &[TrialRecord],
    ) -> ParamValue {
        (**self).sample(param_name, distribution, trial_number, history)
    }
}
