//! Identifier types for entities, clients, and gates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of an entity, stable across the cluster.
///
/// Ids are minted locally (uuid v4, 32 hex chars) and never reused. An
/// entity keeps its id through migration, freeze, and restore; only the
/// hosting server changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Mint a fresh, globally unique entity id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Wrap an existing id, e.g. one received from a peer or storage.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a space; spaces are entities, so this is an entity id.
pub type SpaceId = EntityId;

/// Identifier of a client session, assigned by the gate that owns the
/// connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Mint a fresh client id (useful for tests and local tooling).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Wrap an existing client id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a gate process terminating client connections.
pub type GateId = u16;

/// A client session bound to an entity: the session id plus the gate
/// hosting the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameClient {
    pub client_id: ClientId,
    pub gate_id: GateId,
}

impl GameClient {
    pub fn new(client_id: ClientId, gate_id: GateId) -> Self {
        Self { client_id, gate_id }
    }
}

impl fmt::Display for GameClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@gate{}", self.client_id, self.gate_id)
    }
}
