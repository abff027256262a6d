//! The space surface consumed by the entity core.
//!
//! Spaces are spatial containers for entities and are themselves entities
//! of the distinguished type [`SPACE_ENTITY_TYPE`]. The full space and
//! position subsystem (visibility, replication, movement) lives elsewhere;
//! this module carries exactly what the entity core needs: a manager that
//! resolves space ids to resident spaces, membership enter/leave, the
//! destroyed flag, and the nil-space sentinel.
//!
//! Every game server holds exactly one nil-space (`kind == 0`). It is the
//! root of the space topology: freshly created entities reference it until
//! they enter a real space, and a rebuild after hot upgrade recreates it
//! before anything else.

use crate::entity::entity::Entity;
use crate::entity::{AttrMap, EntityId, SpaceId};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Type name of space entities.
pub const SPACE_ENTITY_TYPE: &str = "__space__";

/// Attribute carrying a space entity's kind. Kind 0 is the nil-space.
pub const SPACE_KIND_ATTR_KEY: &str = "_space_kind";

/// A point in a space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Facing angle, in radians.
pub type Yaw = f32;

/// Read a space kind out of an attribute map, defaulting to the nil kind.
pub(crate) fn space_kind_of(attrs: &AttrMap) -> i64 {
    attrs
        .get(SPACE_KIND_ATTR_KEY)
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(0)
}

/// A resident space: identity, kind, and current membership.
pub struct Space {
    id: SpaceId,
    kind: i64,
    destroyed: Cell<bool>,
    members: RefCell<HashSet<EntityId>>,
}

impl Space {
    pub(crate) fn new(id: SpaceId, kind: i64) -> Self {
        Self {
            id,
            kind,
            destroyed: Cell::new(false),
            members: RefCell::new(HashSet::new()),
        }
    }

    pub fn id(&self) -> &SpaceId {
        &self.id
    }

    pub fn kind(&self) -> i64 {
        self.kind
    }

    /// Whether this is the nil-space sentinel.
    pub fn is_nil(&self) -> bool {
        self.kind == 0
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    /// Number of entities currently in the space.
    pub fn member_count(&self) -> usize {
        self.members.borrow().len()
    }

    pub fn contains(&self, entity_id: &EntityId) -> bool {
        self.members.borrow().contains(entity_id)
    }

    /// Add an entity to the space at a position.
    ///
    /// `is_restore` marks a silent rebuild after hot upgrade: membership is
    /// recorded but no entry events fan out.
    pub(crate) fn enter(&self, entity: &Entity, pos: Position, is_restore: bool) {
        self.members.borrow_mut().insert(entity.id().clone());
        entity.set_position(pos);
        if !is_restore {
            tracing::debug!(space = %self.id, entity = %entity.id(), "entity entered space");
        }
    }

    pub(crate) fn leave(&self, entity: &Entity) {
        self.members.borrow_mut().remove(entity.id());
    }

    pub(crate) fn mark_destroyed(&self) {
        self.destroyed.set(true);
    }
}

impl std::fmt::Debug for Space {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Space")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("destroyed", &self.destroyed.get())
            .finish()
    }
}

/// Ready-made behavior for space entities.
///
/// Spaces carry no game logic of their own in the entity core; the runtime
/// registers and tears down the backing [`Space`] as part of the entity
/// lifecycle. Games with richer space semantics supply their own behavior
/// under [`SPACE_ENTITY_TYPE`] instead.
#[derive(Debug, Default)]
pub struct SpaceBehavior;

impl crate::entity::EntityBehavior for SpaceBehavior {}

/// Registry of spaces resident on this server.
///
/// Uses `RefCell` for single-threaded interior mutability; all access
/// happens on the main loop.
#[derive(Default)]
pub struct SpaceManager {
    spaces: RefCell<HashMap<SpaceId, Rc<Space>>>,
    nil_space: RefCell<Option<Rc<Space>>>,
}

impl SpaceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a space id to a resident space.
    pub fn get_space(&self, id: &SpaceId) -> Option<Rc<Space>> {
        self.spaces.borrow().get(id).cloned()
    }

    /// The nil-space sentinel, once its entity has been created.
    pub fn nil_space(&self) -> Option<Rc<Space>> {
        self.nil_space.borrow().clone()
    }

    pub fn count(&self) -> usize {
        self.spaces.borrow().len()
    }

    /// Register a space created from a space entity. The first kind-0 space
    /// becomes the nil-space sentinel.
    pub(crate) fn register(&self, space: Rc<Space>) {
        if space.is_nil() {
            let mut nil_space = self.nil_space.borrow_mut();
            if nil_space.is_none() {
                *nil_space = Some(space.clone());
            } else {
                tracing::warn!(space = %space.id(), "second nil space registered");
            }
        }
        self.spaces
            .borrow_mut()
            .insert(space.id().clone(), space);
    }

    /// Tear down the space backing a destroyed space entity.
    pub(crate) fn destroy_space(&self, id: &SpaceId) {
        if let Some(space) = self.spaces.borrow_mut().remove(id) {
            space.mark_destroyed();
            let mut nil_space = self.nil_space.borrow_mut();
            if nil_space.as_ref().is_some_and(|nil| nil.id() == id) {
                *nil_space = None;
            }
        }
    }
}
