//! User-facing entity behavior hooks.

use crate::entity::entity::Entity;
use crate::entity::AttrMap;

/// Behavior hooks a user type attaches to an entity.
///
/// One boxed `EntityBehavior` backs each resident entity; the runtime calls
/// into it at lifecycle milestones. Every hook has a default so a behavior
/// only implements what it cares about.
///
/// Hooks run synchronously on the main loop within the lifecycle step that
/// triggers them and must not assume parallelism. Panics in the creation
/// callbacks (`on_created`, `on_migrate_in`, `on_restored`) are caught and
/// logged by the runtime rather than propagated.
///
/// # Example
///
/// ```rust,ignore
/// struct Player;
///
/// impl EntityBehavior for Player {
///     fn on_created(&mut self, entity: &Entity) {
///         tracing::info!(id = %entity.id(), "player spawned");
///     }
///
///     fn is_persistent(&self, _entity: &Entity) -> bool {
///         true
///     }
/// }
/// ```
pub trait EntityBehavior: 'static {
    /// Called exactly once after a fresh creation completes.
    fn on_created(&mut self, _entity: &Entity) {}

    /// Called exactly once after arriving from a peer server.
    fn on_migrate_in(&mut self, _entity: &Entity) {}

    /// Called exactly once after being rebuilt from a freeze snapshot.
    /// Restore is silent; avoid side effects that fan out to clients.
    fn on_restored(&mut self, _entity: &Entity) {}

    /// Called at the start of destruction, before any teardown.
    fn on_destroy(&mut self, _entity: &Entity) {}

    /// Called when a client is bound through the full bind protocol.
    /// The quiet bind used for migration and restore skips this.
    fn on_client_connected(&mut self, _entity: &Entity) {}

    /// Called when the bound client goes away, either explicitly or via a
    /// client/gate disconnect event.
    fn on_client_disconnected(&mut self, _entity: &Entity) {}

    /// Whether this entity is persisted to storage. Persistent entities get
    /// a periodic save timer for as long as they are alive.
    fn is_persistent(&self, _entity: &Entity) -> bool {
        false
    }

    /// Materialize state from a stored attribute record (fresh create with
    /// data). The default replaces the attribute map wholesale.
    fn load_persistent_data(&mut self, entity: &Entity, data: AttrMap) {
        entity.replace_attrs(data);
    }

    /// Materialize state from a migration or freeze payload. The default
    /// replaces the attribute map wholesale.
    fn load_migrate_data(&mut self, entity: &Entity, data: AttrMap) {
        entity.replace_attrs(data);
    }
}
