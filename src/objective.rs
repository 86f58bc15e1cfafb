//! The [`Objective`] trait defines what gets optimized.
//!
//! For simple closures, pass them directly to
//! [`Study::optimize`](crate::Study::optimize):
//!
//! ```
//! use study_coordinator::prelude::*;
//!
//! let study = Study::new(Direction::Minimize);
//! let x = FloatParam::new("x", -10.0, 10.0);
//!
//! study
//!     .optimize(50, |trial| {
//!         let v = x.suggest(trial)?;
//!         Ok::<_, Error>((v - 3.0).powi(2))
//!     })
//!     .unwrap();
//! ```
//!
//! For early stopping, implement [`Objective`] on a struct and pass it to
//! [`Study::optimize_with`](crate::Study::optimize_with):
//!
//! ```
//! use std::ops::ControlFlow;
//!
//! use study_coordinator::prelude::*;
//!
//! struct QuadraticWithEarlyStopping {
//!     x: FloatParam,
//!     target: f64,
//! }
//!
//! impl Objective for QuadraticWithEarlyStopping {
//!     type Error = Error;
//!
//!     fn evaluate(&self, trial: &mut Trial<'_>) -> Result<f64> {
//!         let v = self.x.suggest(trial)?;
//!         Ok((v - 3.0).powi(2))
//!     }
//!
//!     fn after_trial(&self, _study: &Study, trial: &TrialRecord) -> ControlFlow<()> {
//!         if trial.value.is_some_and(|v| v < self.target) {
//!             ControlFlow::Break(())
//!         } else {
//!             ControlFlow::Continue(())
//!         }
//!     }
//! }
//!
//! let study = Study::new(Direction::Minimize);
//! let obj = QuadraticWithEarlyStopping {
//!     x: FloatParam::new("x", -10.0, 10.0),
//!     target: 1.0,
//! };
//! study.optimize_with(&DriverConfig::new(500), &obj).unwrap();
//! assert!(study.best_value().unwrap() < 1.0);
//! ```

use core::ops::ControlFlow;

use crate::record::TrialRecord;
use crate::study::Study;
use crate::trial::Trial;

/// Defines an objective function with lifecycle hooks for optimization.
///
/// The only required method is [`evaluate`](Objective::evaluate), which
/// computes the objective value for a given trial. The optional hooks
/// [`before_trial`](Objective::before_trial) and
/// [`after_trial`](Objective::after_trial) stop the calling worker early.
///
/// A plain closure `Fn(&mut Trial<'_>) -> Result<f64, E>` implements this
/// trait through a blanket impl.
///
/// # Thread safety
///
/// Parallel optimization shares one objective between worker threads and
/// therefore requires `Sync`; the async pool also needs `Send + 'static`.
pub trait Objective {
    /// The error type returned by [`evaluate`](Objective::evaluate).
    type Error: ToString + 'static;

    /// Evaluate the objective function for a single trial.
    ///
    /// Request parameters from `trial` and return the objective value.
    /// Return `Err(TrialPruned)` to prune the trial early.
    ///
    /// # Errors
    ///
    /// Any error whose type implements `ToString`. The driver records the
    /// message as the trial's failure reason. Pruning errors
    /// (`Error::TrialPruned` or `TrialPruned`) are handled specially: the
    /// trial is recorded as pruned rather than failed.
    fn evaluate(&self, trial: &mut Trial<'_>) -> Result<f64, Self::Error>;

    /// Called by a worker before it creates its next trial.
    ///
    /// Return `ControlFlow::Break(())` to stop that worker.
    ///
    /// Default: always continues.
    fn before_trial(&self, _study: &Study) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    /// Called after each **completed** trial (not failed or pruned) with
    /// the record as finalized by the store.
    ///
    /// Return `ControlFlow::Break(())` to stop the worker that ran it.
    ///
    /// Default: always continues.
    fn after_trial(&self, _study: &Study, _trial: &TrialRecord) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

impl<F, E> Objective for F
where
    F: Fn(&mut Trial<'_>) -> Result<f64, E>,
    E: ToString + 'static,
{
    type Error = E;

    fn evaluate(&self, trial: &mut Trial<'_>) -> Result<f64, E> {
        self(trial)
    }
}
