//! Convenience re-exports for working with the entity core.

pub use crate::dispatcher::{BufferedDispatcher, Dispatcher, DispatcherMessage};
pub use crate::entity::{
    AttrMap, ClientId, CreateCause, Entity, EntityBehavior, EntityCore, EntityId, EntityPrototype,
    EntityTypeDesc, FreezeData, GameClient, GateId, RpcMethod, SpaceId,
};
pub use crate::error::{EntityError, FreezeError, RestoreError, StorageError};
pub use crate::runtime::{CoreBuilder, CoreConfig};
pub use crate::space::{
    Position, Space, SpaceBehavior, SpaceManager, Yaw, SPACE_ENTITY_TYPE, SPACE_KIND_ATTR_KEY,
};
pub use crate::storage::{InMemoryStorage, Storage};
pub use crate::task::{TaskSpawner, TokioSpawner};
