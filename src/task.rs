//! Task spawning abstraction for the single-threaded main loop.
//!
//! Everything in this crate runs on one logical thread. Background work
//! (storage loads, periodic saves, deferred space entries) is expressed as
//! local tasks that interleave with the main loop only at await points, so
//! core state is never mutated concurrently.

use std::future::Future;
use std::pin::Pin;
use tokio::task::JoinHandle;

/// A local future with no output, ready to hand to a spawner.
pub type LocalTask = Pin<Box<dyn Future<Output = ()>>>;

/// Spawner for tasks that run on the current thread.
///
/// Object-safe so the entity core can hold it as `Rc<dyn TaskSpawner>`
/// without becoming generic over the provider. Implementations must keep
/// tasks on the spawning thread to preserve single-threaded execution.
pub trait TaskSpawner {
    /// Spawn a named task on the current thread.
    ///
    /// The name is used for diagnostics only. The returned handle may be
    /// used to abort the task (periodic timers are cancelled this way).
    fn spawn(&self, name: &str, task: LocalTask) -> JoinHandle<()>;
}

/// Production spawner backed by `tokio::task::spawn_local`.
///
/// Requires a current-thread runtime with a `LocalSet` (or local runtime)
/// driving it; spawning outside one panics, which surfaces misconfiguration
/// immediately rather than silently dropping work.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSpawner;

impl TaskSpawner for TokioSpawner {
    fn spawn(&self, name: &str, task: LocalTask) -> JoinHandle<()> {
        tracing::trace!(task = name, "spawning local task");
        tokio::task::spawn_local(task)
    }
}
