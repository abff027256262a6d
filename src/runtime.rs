//! Entity core configuration and construction.

use crate::dispatcher::{BufferedDispatcher, Dispatcher};
use crate::entity::manager::EntityCore;
use crate::storage::{InMemoryStorage, Storage};
use crate::task::{TaskSpawner, TokioSpawner};
use std::rc::Rc;
use std::time::Duration;

/// Tunables of the entity core.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Interval of the periodic save timer installed on persistent
    /// entities.
    pub save_interval: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            save_interval: Duration::from_secs(300),
        }
    }
}

/// Builder for [`EntityCore`] with a fluent API.
///
/// Every collaborator has a default suitable for tests and single-node
/// development: a buffered dispatcher, in-memory storage, and the tokio
/// local spawner. Production wires real transports in.
///
/// # Example
///
/// ```rust,ignore
/// let core = EntityCore::builder()
///     .dispatcher(Rc::new(my_dispatcher))
///     .storage(Rc::new(my_storage))
///     .save_interval(Duration::from_secs(60))
///     .build();
/// ```
pub struct CoreBuilder {
    dispatcher: Option<Rc<dyn Dispatcher>>,
    storage: Option<Rc<dyn Storage>>,
    tasks: Option<Rc<dyn TaskSpawner>>,
    config: CoreConfig,
}

impl CoreBuilder {
    pub fn new() -> Self {
        Self {
            dispatcher: None,
            storage: None,
            tasks: None,
            config: CoreConfig::default(),
        }
    }

    /// Set the dispatcher send surface.
    pub fn dispatcher(mut self, dispatcher: Rc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Set the storage backend.
    pub fn storage(mut self, storage: Rc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Set the task spawner driving background work.
    pub fn task_spawner(mut self, tasks: Rc<dyn TaskSpawner>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    /// Set the periodic save interval for persistent entities.
    pub fn save_interval(mut self, interval: Duration) -> Self {
        self.config.save_interval = interval;
        self
    }

    /// Build the entity core.
    pub fn build(self) -> Rc<EntityCore> {
        EntityCore::new(
            self.dispatcher
                .unwrap_or_else(|| Rc::new(BufferedDispatcher::new())),
            self.storage.unwrap_or_else(|| Rc::new(InMemoryStorage::new())),
            self.tasks.unwrap_or_else(|| Rc::new(TokioSpawner)),
            self.config,
        )
    }
}

impl Default for CoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}
