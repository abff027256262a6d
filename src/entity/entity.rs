//! The addressable unit of game state.
//!
//! An [`Entity`] pairs a user behavior with the runtime-owned state the
//! entity core tracks for it: identity, attributes, the containing space,
//! the bound client session, and timers. The core holds the single strong
//! reference to each resident entity; everything else observes through the
//! entity table.
//!
//! All interior state uses `RefCell`/`Cell` for single-threaded interior
//! mutability. Borrows are scoped tightly so user hooks can call back into
//! the entity they are attached to.

use crate::entity::freeze::{EnterSpaceRequest, EntityFreezeData};
use crate::entity::lifecycle::run_panicless;
use crate::entity::manager::EntityCore;
use crate::entity::registry::EntityTypeDesc;
use crate::entity::traits::EntityBehavior;
use crate::entity::{AttrMap, ClientId, EntityId, GameClient, SpaceId};
use crate::space::{Position, Space, Yaw, SPACE_ENTITY_TYPE};
use serde_json::Value;
use std::cell::{Cell, Ref, RefCell};
use std::rc::{Rc, Weak};
use tokio::task::JoinHandle;

/// A resident entity.
pub struct Entity {
    id: EntityId,
    type_name: String,
    desc: Rc<EntityTypeDesc>,
    core: Weak<EntityCore>,
    behavior: RefCell<Box<dyn EntityBehavior>>,
    attrs: RefCell<AttrMap>,
    space: RefCell<Option<Rc<Space>>>,
    client: RefCell<Option<GameClient>>,
    pos: Cell<Position>,
    yaw: Cell<Yaw>,
    /// Cached `is_persistent()` answer, computed once after state
    /// materialization so hot paths never re-enter the behavior.
    persistent: Cell<bool>,
    /// Opaque timer token carried through migration and freeze; the timer
    /// subsystem owns its meaning.
    timer_token: RefCell<Option<Vec<u8>>>,
    save_timer: RefCell<Option<JoinHandle<()>>>,
    /// In-flight space entry, kept until the entry lands so a freeze taken
    /// mid-entry can replay it after restore.
    entering_space: RefCell<Option<EnterSpaceRequest>>,
    destroyed: Cell<bool>,
}

impl Entity {
    pub(crate) fn new(
        type_name: &str,
        id: EntityId,
        desc: Rc<EntityTypeDesc>,
        behavior: Box<dyn EntityBehavior>,
        core: Weak<EntityCore>,
    ) -> Self {
        Self {
            id,
            type_name: type_name.to_string(),
            desc,
            core,
            behavior: RefCell::new(behavior),
            attrs: RefCell::new(AttrMap::new()),
            space: RefCell::new(None),
            client: RefCell::new(None),
            pos: Cell::new(Position::default()),
            yaw: Cell::new(0.0),
            persistent: Cell::new(false),
            timer_token: RefCell::new(None),
            save_timer: RefCell::new(None),
            entering_space: RefCell::new(None),
            destroyed: Cell::new(false),
        }
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn desc(&self) -> &Rc<EntityTypeDesc> {
        &self.desc
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    /// Whether this entity is a space.
    pub fn is_space_entity(&self) -> bool {
        self.type_name == SPACE_ENTITY_TYPE
    }

    /// Kind of this space entity, 0 for the nil-space. Only meaningful when
    /// [`Entity::is_space_entity`] holds.
    pub fn space_kind(&self) -> i64 {
        crate::space::space_kind_of(&self.attrs.borrow())
    }

    /// The space currently containing this entity (the nil-space until it
    /// enters a real one).
    pub fn space(&self) -> Option<Rc<Space>> {
        self.space.borrow().clone()
    }

    pub fn position(&self) -> Position {
        self.pos.get()
    }

    pub fn yaw(&self) -> Yaw {
        self.yaw.get()
    }

    pub(crate) fn set_position(&self, pos: Position) {
        self.pos.set(pos);
    }

    /// The bound client session, if any.
    pub fn client(&self) -> Option<GameClient> {
        self.client.borrow().clone()
    }

    /// Whether the entity is persisted to storage (cached at creation).
    pub fn is_persistent(&self) -> bool {
        self.persistent.get()
    }

    // ---- attributes ----

    /// Borrow the attribute map. Release the borrow before invoking
    /// anything that may mutate attributes.
    pub fn attrs(&self) -> Ref<'_, AttrMap> {
        self.attrs.borrow()
    }

    pub fn get_attr(&self, name: &str) -> Option<Value> {
        self.attrs.borrow().get(name).cloned()
    }

    pub fn set_attr(&self, name: impl Into<String>, value: Value) {
        self.attrs.borrow_mut().insert(name.into(), value);
    }

    /// Replace the attribute map wholesale, as the default load hooks do.
    pub fn replace_attrs(&self, attrs: AttrMap) {
        *self.attrs.borrow_mut() = attrs;
    }

    /// The subset of attributes classified persistent, as written to
    /// storage.
    pub fn persistent_data(&self) -> AttrMap {
        self.attrs
            .borrow()
            .iter()
            .filter(|(name, _)| self.desc.is_persistent_attr(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    // ---- behavior access ----

    pub(crate) fn with_behavior<R>(&self, f: impl FnOnce(&mut dyn EntityBehavior) -> R) -> R {
        let mut behavior = self.behavior.borrow_mut();
        f(behavior.as_mut())
    }

    /// Compute and cache the persistence flag. Runs once per entity, after
    /// state materialization.
    pub(crate) fn cache_persistence(&self) {
        let persistent = self.behavior.borrow().is_persistent(self);
        self.persistent.set(persistent);
    }

    // ---- client binding ----

    /// Bind or unbind a client through the full bind protocol.
    ///
    /// Unbinding fires `on_client_disconnected`. Binding steals the client
    /// from any prior owner (tearing that owner's binding down first, with
    /// its callbacks), records the ownership index entry, and fires
    /// `on_client_connected`.
    pub fn set_client(&self, new_client: Option<GameClient>) {
        let Some(core) = self.core.upgrade() else {
            return;
        };

        let current = self.client.borrow().clone();
        if current == new_client {
            return;
        }

        if let Some(old) = current {
            core.on_entity_lose_client(&old.client_id);
            *self.client.borrow_mut() = None;
            run_panicless("on_client_disconnected", || {
                self.with_behavior(|b| b.on_client_disconnected(self));
            });
        }

        if let Some(client) = new_client {
            if let Some(owner_id) = core.owner_of_client(&client.client_id) {
                if owner_id != self.id {
                    core.on_entity_lose_client(&client.client_id);
                    if let Some(prior) = core.get_entity(&owner_id) {
                        prior.notify_client_disconnected();
                    }
                }
            }

            *self.client.borrow_mut() = Some(client.clone());
            core.on_entity_get_client(&self.id, &client.client_id);
            run_panicless("on_client_connected", || {
                self.with_behavior(|b| b.on_client_connected(self));
            });
        }
    }

    /// Assign a client without bind-time callbacks, for entities arriving
    /// via migration or restore where those callbacks already fired on the
    /// source side.
    pub(crate) fn bind_client_quietly(&self, core: &Rc<EntityCore>, client: GameClient) {
        *self.client.borrow_mut() = Some(client.clone());
        core.on_entity_get_client(&self.id, &client.client_id);
    }

    /// Clear the bound client and deliver the disconnect hook. The caller
    /// owns the ownership-index side of the teardown.
    pub(crate) fn notify_client_disconnected(&self) {
        self.client.borrow_mut().take();
        run_panicless("on_client_disconnected", || {
            self.with_behavior(|b| b.on_client_disconnected(self));
        });
    }

    // ---- persistence ----

    /// Write the persistent attribute subset to storage.
    ///
    /// No-op for non-persistent entities. The write runs as a spawned local
    /// task so the main loop never blocks on the backend.
    pub fn save(&self) {
        if !self.persistent.get() {
            return;
        }
        let Some(core) = self.core.upgrade() else {
            return;
        };

        let type_name = self.type_name.clone();
        let id = self.id.clone();
        let data = self.persistent_data();
        let storage = core.storage().clone();
        core.tasks().spawn(
            "entity_save",
            Box::pin(async move {
                if let Err(err) = storage.write(&type_name, &id, &data).await {
                    tracing::error!(entity = %id, %err, "failed to write entity record");
                }
            }),
        );
    }

    /// Install the periodic save timer for a persistent entity.
    pub(crate) fn setup_save_timer(self: &Rc<Self>, core: &Rc<EntityCore>) {
        let interval = core.config().save_interval;
        let weak = Rc::downgrade(self);
        let handle = core.tasks().spawn(
            "entity_save_timer",
            Box::pin(async move {
                loop {
                    tokio::time::sleep(interval).await;
                    let Some(entity) = weak.upgrade() else { break };
                    if entity.is_destroyed() {
                        break;
                    }
                    entity.save();
                }
            }),
        );
        *self.save_timer.borrow_mut() = Some(handle);
    }

    /// Whether the periodic save timer is currently installed.
    pub fn has_save_timer(&self) -> bool {
        self.save_timer.borrow().is_some()
    }

    /// Adopt a timer token captured on another server or in a snapshot.
    /// The token is opaque here; it rides along into the next freeze.
    pub(crate) fn restore_timers(&self, token: Vec<u8>) {
        *self.timer_token.borrow_mut() = Some(token);
    }

    // ---- space movement ----

    /// Request entry into a space at a position.
    ///
    /// The in-flight request is recorded before resolution so a freeze
    /// taken while the target is not yet resident replays the entry after
    /// restore. A locally resident, live target is entered immediately.
    pub fn enter_space(&self, space_id: &SpaceId, pos: Position) {
        let Some(core) = self.core.upgrade() else {
            return;
        };

        {
            let current = self.space.borrow();
            if current.as_ref().is_some_and(|space| space.id() == space_id) {
                tracing::warn!(entity = %self.id, space = %space_id, "already in target space");
                return;
            }
        }

        *self.entering_space.borrow_mut() = Some(EnterSpaceRequest {
            space_id: space_id.clone(),
            enter_pos: pos,
        });

        match core.spaces().get_space(space_id) {
            Some(space) if !space.is_destroyed() => {
                self.enter_space_direct(&space, pos, false);
                self.entering_space.borrow_mut().take();
            }
            _ => {
                tracing::warn!(
                    entity = %self.id,
                    space = %space_id,
                    "target space not resident; entry left pending"
                );
            }
        }
    }

    /// Move into a resident space, leaving the current one.
    pub(crate) fn enter_space_direct(&self, space: &Rc<Space>, pos: Position, is_restore: bool) {
        if let Some(prev) = self.space.borrow_mut().take() {
            prev.leave(self);
        }
        space.enter(self, pos, is_restore);
        *self.space.borrow_mut() = Some(space.clone());
    }

    pub(crate) fn set_space(&self, space: Option<Rc<Space>>) {
        *self.space.borrow_mut() = space;
    }

    /// Apply a client-authoritative position and yaw update.
    pub(crate) fn sync_position_yaw_from_client(&self, x: f32, y: f32, z: f32, yaw: Yaw) {
        self.pos.set(Position::new(x, y, z));
        self.yaw.set(yaw);
    }

    // ---- RPC delivery ----

    /// Deliver an inbound RPC: locate the descriptor, decode the raw
    /// arguments, invoke. Failures are logged and dropped; a bad call must
    /// not take down the server.
    pub(crate) fn on_call_from_remote(
        &self,
        method: &str,
        raw_args: &[Vec<u8>],
        client_id: Option<ClientId>,
    ) {
        let Some(rpc_desc) = self.desc.rpc_desc(method) else {
            tracing::error!(entity = %self.id, method, "unknown RPC method");
            return;
        };

        let mut args = Vec::with_capacity(raw_args.len());
        for raw in raw_args {
            match serde_json::from_slice(raw) {
                Ok(value) => args.push(value),
                Err(err) => {
                    tracing::error!(entity = %self.id, method, %err, "undecodable RPC argument");
                    return;
                }
            }
        }

        let result = self.with_behavior(|b| rpc_desc.invoke(b, self, args, client_id));
        if let Err(err) = result {
            tracing::error!(entity = %self.id, method, %err, "RPC invocation failed");
        }
    }

    // ---- destruction ----

    /// Destroy this entity.
    ///
    /// Runs the user's `on_destroy` hook (panic-isolated), then tears down
    /// everything the runtime tracks for the entity: space membership,
    /// client binding, timers, service declarations, the table entry, and
    /// finally tells the dispatcher so peers forget the location.
    pub fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        let Some(core) = self.core.upgrade() else {
            return;
        };
        tracing::debug!(entity = %self.id, type_name = %self.type_name, "destroying entity");

        run_panicless("on_destroy", || {
            self.with_behavior(|b| b.on_destroy(self));
        });

        if let Some(space) = self.space.borrow_mut().take() {
            space.leave(self);
        }
        if self.is_space_entity() {
            core.spaces().destroy_space(&self.id);
        }

        if let Some(client) = self.client.borrow_mut().take() {
            core.on_entity_lose_client(&client.client_id);
        }

        if let Some(handle) = self.save_timer.borrow_mut().take() {
            handle.abort();
        }

        core.undeclare_all_services_of(&self.id);
        core.remove_entity(&self.id);
        core.dispatcher().send_notify_destroy_entity(&self.id);
    }

    // ---- freeze ----

    /// Capture everything needed to rebuild this entity after hot upgrade.
    pub(crate) fn freeze_data(&self) -> EntityFreezeData {
        EntityFreezeData {
            type_name: self.type_name.clone(),
            attrs: self.attrs.borrow().clone(),
            pos: self.pos.get(),
            yaw: self.yaw.get(),
            client: self.client.borrow().clone(),
            space_id: self.space.borrow().as_ref().map(|space| space.id().clone()),
            timer_data: self.timer_token.borrow().clone(),
            esr: self.entering_space.borrow().clone(),
        }
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("destroyed", &self.destroyed.get())
            .finish()
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}<{}>", self.type_name, self.id)
    }
}
