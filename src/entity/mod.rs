//! Entity types, registry, and lifecycle.

pub mod entity;
pub mod freeze;
pub mod id;
pub mod lifecycle;
pub mod manager;
pub mod registry;
pub mod traits;

pub use entity::Entity;
pub use freeze::{EnterSpaceRequest, EntityFreezeData, FreezeData};
pub use id::{ClientId, EntityId, GameClient, GateId, SpaceId};
pub use lifecycle::CreateCause;
pub use manager::EntityCore;
pub use registry::{EntityPrototype, EntityTypeDesc, RpcInvoker, RpcMethod};
pub use traits::EntityBehavior;

/// Attribute map of an entity: name to JSON value, the shape entity state
/// takes on the wire and in storage.
pub type AttrMap = std::collections::HashMap<String, serde_json::Value>;
