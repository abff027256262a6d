//! Create-cause dispatch and user-callback panic isolation.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Why an entity is being materialized on this server.
///
/// The cause selects the lifecycle side effects: which user callback runs,
/// whether the dispatcher is told about the new location, and whether a
/// supplied client is bound through the full protocol or quietly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateCause {
    /// Fresh creation; the entity did not exist anywhere before.
    Create,

    /// Arrived from a peer server that migrated it here.
    Migrate,

    /// Rebuilt from a freeze snapshot during hot upgrade.
    Restore,
}

impl CreateCause {
    /// Whether the dispatcher must learn about the new residency.
    ///
    /// Migration is the exception: the dispatcher orchestrated the move and
    /// already knows where the entity landed.
    pub(crate) fn notifies_dispatcher(self) -> bool {
        matches!(self, CreateCause::Create | CreateCause::Restore)
    }

    /// Whether a supplied client is bound without bind-time callbacks.
    ///
    /// For migration and restore those callbacks already fired on the
    /// source side; re-running them would double their effects.
    pub(crate) fn binds_quietly(self) -> bool {
        matches!(self, CreateCause::Migrate | CreateCause::Restore)
    }

    pub(crate) fn is_restore(self) -> bool {
        matches!(self, CreateCause::Restore)
    }

    /// Name of the user callback this cause dispatches to.
    pub(crate) fn callback_name(self) -> &'static str {
        match self {
            CreateCause::Create => "on_created",
            CreateCause::Migrate => "on_migrate_in",
            CreateCause::Restore => "on_restored",
        }
    }
}

/// Run a user callback, logging and swallowing any panic.
///
/// User code must not be able to corrupt runtime state by panicking inside
/// a lifecycle hook; the failed callback is reported and the lifecycle step
/// continues.
pub(crate) fn run_panicless<F: FnOnce()>(what: &str, f: F) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
        tracing::error!(
            callback = what,
            cause = %panic_message(payload.as_ref()),
            "user callback panicked; continuing"
        );
    }
}

/// Best-effort extraction of a panic payload's message.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cause_dispatch_table() {
        assert!(CreateCause::Create.notifies_dispatcher());
        assert!(CreateCause::Restore.notifies_dispatcher());
        assert!(!CreateCause::Migrate.notifies_dispatcher());

        assert!(!CreateCause::Create.binds_quietly());
        assert!(CreateCause::Migrate.binds_quietly());
        assert!(CreateCause::Restore.binds_quietly());

        assert!(CreateCause::Restore.is_restore());
        assert!(!CreateCause::Create.is_restore());
    }

    #[test]
    fn test_run_panicless_swallows_panics() {
        run_panicless("test_callback", || panic!("boom"));
        // Reaching here is the assertion.
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload: Box<dyn Any + Send> = Box::new("owned".to_string());
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn Any + Send> = Box::new(42_u32);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
