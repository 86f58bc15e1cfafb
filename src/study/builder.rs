use std::sync::Arc;

use crate::error::{Error, Result};
use crate::sampler::{RandomSampler, Sampler};
use crate::storage::{MemoryStorage, Storage};
use crate::types::Direction;

use super::{Study, generated_name};

/// A builder for constructing [`Study`] instances with a fluent API.
///
/// Created via [`Study::builder()`]. Collects name, direction, sampler and
/// storage options, then registers the study with the backend.
///
/// # Defaults
///
/// - Name: `no-name-<uuid>`
/// - Direction: [`Minimize`](Direction::Minimize)
/// - Sampler: [`RandomSampler`]
/// - Storage: a fresh [`MemoryStorage`]
///
/// # Examples
///
/// Several processes can run the same builder against one journal file;
/// whichever gets there first creates the study and the others attach to
/// it:
///
/// ```no_run
/// # #[cfg(feature = "journal")]
/// # {
/// use study_coordinator::prelude::*;
///
/// let study = Study::builder()
///     .name("distributed")
///     .maximize()
///     .storage(JournalStorage::new("study.jsonl"))
///     .load_if_exists(true)
///     .build()
///     .unwrap();
/// # }
/// ```
pub struct StudyBuilder {
    name: Option<String>,
    direction: Direction,
    sampler: Option<Arc<dyn Sampler>>,
    storage: Option<Arc<dyn Storage>>,
    load_if_exists: bool,
}

impl StudyBuilder {
    /// Create a new builder with default settings.
    pub(super) fn new() -> Self {
        Self {
            name: None,
            direction: Direction::Minimize,
            sampler: None,
            storage: None,
            load_if_exists: false,
        }
    }

    /// Set the study name. Names are unique per backend.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the optimization direction to minimize (the default).
    #[must_use]
    pub fn minimize(mut self) -> Self {
        self.direction = Direction::Minimize;
        self
    }

    /// Set the optimization direction to maximize.
    #[must_use]
    pub fn maximize(mut self) -> Self {
        self.direction = Direction::Maximize;
        self
    }

    /// Set the optimization direction explicitly.
    #[must_use]
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Set the sampler used for parameter suggestions.
    ///
    /// Defaults to [`RandomSampler`] if not specified.
    #[must_use]
    pub fn sampler(mut self, sampler: impl Sampler + 'static) -> Self {
        self.sampler = Some(Arc::new(sampler));
        self
    }

    /// Set a storage backend owned by this study.
    ///
    /// Defaults to [`MemoryStorage`] if not specified.
    #[must_use]
    pub fn storage(mut self, storage: impl Storage + 'static) -> Self {
        self.storage = Some(Arc::new(storage));
        self
    }

    /// Set a storage backend that other studies or handles also use.
    #[must_use]
    pub fn shared_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Attach to the study instead of failing when the name is taken.
    ///
    /// The attached study keeps the direction it was created with.
    #[must_use]
    pub fn load_if_exists(mut self, load_if_exists: bool) -> Self {
        self.load_if_exists = load_if_exists;
        self
    }

    /// Register the study with the backend and build the [`Study`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateStudy`] if the name is taken and
    /// `load_if_exists` is off, or a storage error.
    pub fn build(self) -> Result<Study> {
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        let sampler = self
            .sampler
            .unwrap_or_else(|| Arc::new(RandomSampler::new()));
        let name = self.name.unwrap_or_else(generated_name);

        let (id, direction) = match storage.create_study(&name, self.direction) {
            Ok(id) => {
                trace_info!(study = %name, id, direction = %self.direction, "study created");
                (id, self.direction)
            }
            Err(Error::DuplicateStudy(_)) if self.load_if_exists => {
                let id = storage.study_id(&name)?;
                let direction = storage.study_direction(id)?;
                trace_info!(study = %name, id, "study loaded");
                (id, direction)
            }
            Err(e) => return Err(e),
        };

        Ok(Study {
            id,
            name: name.into(),
            direction,
            sampler,
            storage,
        })
    }
}
