//! In-memory storage implementation for testing.

use crate::entity::{AttrMap, EntityId};
use crate::error::StorageError;
use crate::storage::Storage;
use async_trait::async_trait;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

/// Simple in-memory storage keeping serialized records per type and id.
///
/// Suitable for tests and single-node development. Records are stored as
/// JSON bytes, the same shape a real backend would persist, and are lost
/// when the process terminates.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    records: RefCell<HashMap<String, HashMap<EntityId, Vec<u8>>>>,
    fail_loads: Cell<bool>,
}

impl InMemoryStorage {
    /// Create a new empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored records across all types.
    pub fn len(&self) -> usize {
        self.records.borrow().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make subsequent loads fail, simulating a backend outage.
    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.set(fail);
    }
}

#[async_trait(?Send)]
impl Storage for InMemoryStorage {
    async fn load(
        &self,
        type_name: &str,
        entity_id: &EntityId,
    ) -> Result<Option<AttrMap>, StorageError> {
        if self.fail_loads.get() {
            return Err(StorageError::Unavailable);
        }
        let records = self.records.borrow();
        match records.get(type_name).and_then(|by_id| by_id.get(entity_id)) {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }

    async fn write(
        &self,
        type_name: &str,
        entity_id: &EntityId,
        data: &AttrMap,
    ) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(data)?;
        self.records
            .borrow_mut()
            .entry(type_name.to_string())
            .or_default()
            .insert(entity_id.clone(), bytes);
        Ok(())
    }

    async fn exists(&self, type_name: &str, entity_id: &EntityId) -> Result<bool, StorageError> {
        Ok(self
            .records
            .borrow()
            .get(type_name)
            .is_some_and(|by_id| by_id.contains_key(entity_id)))
    }

    async fn list(&self, type_name: &str) -> Result<Vec<EntityId>, StorageError> {
        Ok(self
            .records
            .borrow()
            .get(type_name)
            .map(|by_id| by_id.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> AttrMap {
        let mut attrs = AttrMap::new();
        attrs.insert("hp".to_string(), json!(100));
        attrs
    }

    #[tokio::test]
    async fn test_write_and_load_roundtrip() {
        let storage = InMemoryStorage::new();
        let id = EntityId::generate();

        storage.write("Player", &id, &record()).await.unwrap();

        let loaded = storage.load("Player", &id).await.unwrap();
        assert_eq!(loaded, Some(record()));
        assert!(storage.exists("Player", &id).await.unwrap());
    }

    #[tokio::test]
    async fn test_load_missing_record_returns_none() {
        let storage = InMemoryStorage::new();
        let loaded = storage.load("Player", &EntityId::generate()).await.unwrap();
        assert_eq!(loaded, None);
    }

    #[tokio::test]
    async fn test_list_is_scoped_by_type() {
        let storage = InMemoryStorage::new();
        let player = EntityId::generate();
        let npc = EntityId::generate();

        storage.write("Player", &player, &record()).await.unwrap();
        storage.write("Npc", &npc, &record()).await.unwrap();

        let players = storage.list("Player").await.unwrap();
        assert_eq!(players, vec![player]);
    }

    #[tokio::test]
    async fn test_injected_load_failure() {
        let storage = InMemoryStorage::new();
        let id = EntityId::generate();
        storage.write("Player", &id, &record()).await.unwrap();

        storage.set_fail_loads(true);
        assert!(storage.load("Player", &id).await.is_err());

        storage.set_fail_loads(false);
        assert!(storage.load("Player", &id).await.is_ok());
    }
}
