//! Durable entity storage abstraction.

pub mod memory;

pub use memory::InMemoryStorage;

use crate::entity::{AttrMap, EntityId};
use crate::error::StorageError;
use async_trait::async_trait;

/// Backend for persisting entity attribute records.
///
/// Implementations are free to block internally on their own threads, but
/// the async surface means callers on the main loop only ever suspend, so
/// no core state is held across a storage round-trip.
#[async_trait(?Send)]
pub trait Storage {
    /// Load the stored record of an entity.
    ///
    /// Returns `Ok(None)` when no record exists. Callers treat a missing
    /// record the same as an error when the entity was expected to exist.
    async fn load(
        &self,
        type_name: &str,
        entity_id: &EntityId,
    ) -> Result<Option<AttrMap>, StorageError>;

    /// Write (or overwrite) the stored record of an entity.
    async fn write(
        &self,
        type_name: &str,
        entity_id: &EntityId,
        data: &AttrMap,
    ) -> Result<(), StorageError>;

    /// Whether a record exists for the entity.
    async fn exists(&self, type_name: &str, entity_id: &EntityId) -> Result<bool, StorageError>;

    /// List all stored entity ids of a type.
    async fn list(&self, type_name: &str) -> Result<Vec<EntityId>, StorageError>;
}
