#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]

//! A shared trial-coordination store for distributed hyperparameter
//! optimization.
//!
//! Many workers (threads of one process, or independent processes sharing a
//! storage file) repeatedly ask a study for a new trial, request parameter
//! values for it, evaluate an objective and report the outcome. The study
//! serializes every mutation through a [`Storage`](storage::Storage)
//! backend, so trial numbers stay dense and each trial moves through its
//! state machine exactly once, however many workers race on it.
//!
//! # Getting Started
//!
//! ```
//! use study_coordinator::prelude::*;
//!
//! let study = Study::new(Direction::Minimize);
//! let x = FloatParam::new("x", -10.0, 10.0);
//!
//! study
//!     .optimize(50, |trial: &mut Trial<'_>| {
//!         let v = x.suggest(trial)?;
//!         Ok::<_, Error>((v - 3.0).powi(2))
//!     })
//!     .unwrap();
//!
//! let best = study.best_trial().unwrap();
//! println!("x = {:.4}, f(x) = {:?}", best.get(&x).unwrap(), best.value);
//! ```
//!
//! # Core Concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`Study`] | The coordinator facade: create trials, suggest parameters, finalize outcomes, query the best trial. |
//! | [`Trial`] | Handle given to the objective; requests parameters through the study. |
//! | [`TrialRecord`] | Snapshot of one trial as the storage backend holds it. |
//! | [`Distribution`] | Search-space descriptor of one parameter (int range, float range, categorical). |
//! | [`Sampler`](sampler::Sampler) | Strategy that picks a value from a distribution given the completed history. |
//! | [`Storage`](storage::Storage) | Backend that allocates trial numbers and mutates records atomically. |
//! | [`Driver`] | The worker loop; [`Study::optimize_parallel`] runs a pool of them. |
//!
//! # Feature Flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) at trial creation, finalize, retries and worker start/stop | on |
//! | `serde` | `Serialize`/`Deserialize` on public data types | off |
//! | `journal` | [`JournalStorage`](storage::JournalStorage): JSONL operation log shared across processes with file locking (enables `serde`) | off |
//! | `sqlite` | [`SqliteStorage`](storage::SqliteStorage): `SQLite` tables with `BEGIN IMMEDIATE` transactions (enables `serde`) | off |
//! | `async` | [`Study::optimize_async`] running workers on tokio's blocking pool | off |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::warn!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_warn {
    ($($arg:tt)*) => { tracing::warn!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_warn {
    ($($arg:tt)*) => {};
}

pub mod distribution;
mod driver;
mod error;
pub mod objective;
mod param;
pub mod parameter;
mod record;
mod rng_util;
pub mod sampler;
pub mod storage;
mod study;
mod trial;
mod types;

pub use distribution::Distribution;
pub use driver::{Driver, DriverConfig, OptimizeReport, RetryPolicy, WorkerReport};
pub use error::{Error, Result, TrialPruned};
pub use objective::Objective;
pub use param::ParamValue;
pub use record::{Outcome, TrialRecord};
pub use study::{Study, StudyBuilder, StudySummary};
pub use trial::Trial;
pub use types::{Direction, StudyId, TrialState};

/// Convenient wildcard import for the most common types.
///
/// ```
/// use study_coordinator::prelude::*;
/// ```
pub mod prelude {
    pub use crate::distribution::Distribution;
    pub use crate::driver::{Driver, DriverConfig, OptimizeReport, RetryPolicy, WorkerReport};
    pub use crate::error::{Error, Result, TrialPruned};
    pub use crate::objective::Objective;
    pub use crate::param::ParamValue;
    pub use crate::parameter::{BoolParam, CategoricalParam, FloatParam, IntParam, Parameter};
    pub use crate::record::{Outcome, TrialRecord};
    pub use crate::sampler::{RandomSampler, Sampler};
    #[cfg(feature = "journal")]
    pub use crate::storage::JournalStorage;
    #[cfg(feature = "sqlite")]
    pub use crate::storage::SqliteStorage;
    pub use crate::storage::{MemoryStorage, Storage};
    pub use crate::study::{Study, StudyBuilder, StudySummary};
    pub use crate::trial::Trial;
    pub use crate::types::{Direction, StudyId, TrialState};
}
