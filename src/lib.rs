//! Warren: the entity core of a distributed game-server runtime.
//!
//! A cluster of game servers coordinates through a central dispatcher, with
//! clients connected via gate processes. Warren is the in-process half of
//! that picture: the authoritative table of entities resident on *this*
//! server, their lifecycle, the client ownership index, the service
//! directory, and the freeze/restore machinery used for hot upgrades.
//!
//! # Core Concepts
//!
//! - **Entity**: the addressable unit of server-authoritative game state
//!   (players, NPCs, spaces, singleton services), identified by a stable
//!   [`EntityId`](entity::EntityId) that survives migration and upgrade
//! - **Create-cause**: an entity materializes here by fresh creation,
//!   migration from a peer, or restore from a snapshot; the cause selects
//!   the lifecycle side effects
//! - **Space**: a spatial container for entities, itself an entity of a
//!   distinguished type; the unique nil-space roots the topology
//! - **Service**: a named capability provided by one or more entities,
//!   located through uniform random selection over the directory
//! - **Single-threaded execution**: everything runs on one logical thread;
//!   storage loads, periodic saves, and deferred space entries are local
//!   tasks that interleave only at await points
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use warren::prelude::*;
//!
//! #[derive(Default)]
//! struct Player;
//!
//! impl EntityBehavior for Player {
//!     fn on_created(&mut self, entity: &Entity) {
//!         tracing::info!(id = %entity.id(), "player spawned");
//!     }
//!
//!     fn is_persistent(&self, _entity: &Entity) -> bool {
//!         true
//!     }
//! }
//!
//! fn main() {
//!     let core = EntityCore::builder().build();
//!
//!     let desc = core.register_entity("Player", EntityPrototype::new(Player::default));
//!     desc.define_attrs(&[
//!         ("hp", &["persistent", "client"]),
//!         ("name", &["allclients", "persistent"]),
//!     ]);
//!
//!     let rt = tokio::runtime::Builder::new_current_thread()
//!         .enable_time()
//!         .build()
//!         .unwrap();
//!     let local = tokio::task::LocalSet::new();
//!     local.block_on(&rt, async move {
//!         let id = core.create_entity_locally("Player", None, None);
//!         assert!(core.get_entity(&id).is_some());
//!     });
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      EntityCore                            │
//! │  (type registry, entity table, ownership index, services)  │
//! └──────┬──────────────┬───────────────┬──────────────┬───────┘
//!        │              │               │              │
//!        ▼              ▼               ▼              ▼
//! ┌────────────┐ ┌────────────┐ ┌─────────────┐ ┌────────────┐
//! │ Dispatcher │ │  Storage   │ │ SpaceManager│ │ TaskSpawner│
//! │ (cluster   │ │ (records)  │ │ (topology)  │ │ (main-loop │
//! │  sends)    │ │            │ │             │ │  tasks)    │
//! └────────────┘ └────────────┘ └─────────────┘ └────────────┘
//! ```

pub mod dispatcher;
pub mod entity;
pub mod error;
pub mod runtime;
pub mod space;
pub mod storage;
pub mod task;

pub mod prelude;
