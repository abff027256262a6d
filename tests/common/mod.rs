//! Shared fixtures for entity-core integration tests.
#![allow(dead_code)]

use serde_json::json;
use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use warren::prelude::*;

/// Run a future on a current-thread runtime inside a `LocalSet`, the way a
/// game-server main loop drives the core. Spawned local tasks (storage
/// loads, save timers, deferred space entries) interleave with the future
/// at its await points.
pub fn run_local<F: Future>(future: F) -> F::Output {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("failed to build current-thread runtime");
    let local = tokio::task::LocalSet::new();
    local.block_on(&rt, future)
}

/// Yield a few times so spawned local tasks run to their next suspension.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

/// Chronological record of behavior hook firings, shared across every
/// entity created from a recording prototype.
pub type EventLog = Rc<RefCell<Vec<(EntityId, &'static str)>>>;

pub fn new_log() -> EventLog {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn count_events(log: &EventLog, id: &EntityId, kind: &str) -> usize {
    log.borrow()
        .iter()
        .filter(|(eid, k)| eid == id && *k == kind)
        .count()
}

/// Ids of all events of one kind, in firing order.
pub fn events_of_kind(log: &EventLog, kind: &str) -> Vec<EntityId> {
    log.borrow()
        .iter()
        .filter(|(_, k)| *k == kind)
        .map(|(eid, _)| eid.clone())
        .collect()
}

/// Behavior that appends every hook firing to a shared log.
pub struct RecordingBehavior {
    log: EventLog,
    persistent: bool,
}

impl RecordingBehavior {
    fn push(&self, entity: &Entity, kind: &'static str) {
        self.log.borrow_mut().push((entity.id().clone(), kind));
    }
}

impl EntityBehavior for RecordingBehavior {
    fn on_created(&mut self, entity: &Entity) {
        self.push(entity, "created");
    }

    fn on_migrate_in(&mut self, entity: &Entity) {
        self.push(entity, "migrate_in");
    }

    fn on_restored(&mut self, entity: &Entity) {
        self.push(entity, "restored");
    }

    fn on_destroy(&mut self, entity: &Entity) {
        self.push(entity, "destroy");
    }

    fn on_client_connected(&mut self, entity: &Entity) {
        self.push(entity, "client_connected");
    }

    fn on_client_disconnected(&mut self, entity: &Entity) {
        self.push(entity, "client_disconnected");
    }

    fn is_persistent(&self, _entity: &Entity) -> bool {
        self.persistent
    }
}

/// Prototype producing [`RecordingBehavior`] instances sharing one log.
pub fn recording_prototype(log: &EventLog, persistent: bool) -> EntityPrototype {
    let log = log.clone();
    EntityPrototype::new(move || RecordingBehavior {
        log: log.clone(),
        persistent,
    })
}

/// Register the space entity type with the stock behavior.
pub fn register_space_type(core: &EntityCore) {
    core.register_entity(SPACE_ENTITY_TYPE, EntityPrototype::new(SpaceBehavior::default));
}

/// Attribute map for a space entity of the given kind.
pub fn space_attrs(kind: i64) -> AttrMap {
    let mut attrs = AttrMap::new();
    attrs.insert(SPACE_KIND_ATTR_KEY.to_string(), json!(kind));
    attrs
}

/// Attribute map for the test player type.
pub fn player_attrs(hp: i64, name: &str) -> AttrMap {
    let mut attrs = AttrMap::new();
    attrs.insert("hp".to_string(), json!(hp));
    attrs.insert("name".to_string(), json!(name));
    attrs
}

/// Register a "Player" type recording into `log`, with hp/name attributes
/// classified persistent.
pub fn register_player_type(core: &EntityCore, log: &EventLog, persistent: bool) {
    let desc = core.register_entity("Player", recording_prototype(log, persistent));
    desc.define_attrs(&[
        ("hp", &["persistent", "client"]),
        ("name", &["allclients", "persistent"]),
    ]);
}
