//! The entity core: resident table, client ownership, services, lifecycle.
//!
//! [`EntityCore`] owns the authoritative table of entities resident on this
//! server and everything keyed off it: the client ownership index used to
//! route client events, the service directory, the creation orchestrator,
//! and the call router. It is process-wide state driven from a single
//! logical thread; interior mutability is `RefCell`, never a lock, and
//! every mutation happens on the main loop.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ EntityCore                                               │
//! │                                                          │
//! │  entities:        EntityId → Rc<Entity>     (the table)  │
//! │  owner_of_client: ClientId → EntityId                    │
//! │  services:        name → {EntityId, ...}                 │
//! │                                                          │
//! │  dispatcher ──▶ cluster sends     storage ──▶ records    │
//! │  spaces     ──▶ space topology    tasks   ──▶ main loop  │
//! └──────────────────────────────────────────────────────────┘
//! ```

use crate::dispatcher::Dispatcher;
use crate::entity::entity::Entity;
use crate::entity::lifecycle::{run_panicless, CreateCause};
use crate::entity::registry::{EntityPrototype, EntityTypeDesc};
use crate::entity::{AttrMap, ClientId, EntityId, GameClient, GateId};
use crate::runtime::{CoreBuilder, CoreConfig};
use crate::space::{Position, Space, SpaceManager, Yaw};
use crate::storage::Storage;
use crate::task::TaskSpawner;
use rand::Rng;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

/// Arguments of one entity materialization.
///
/// Collected into a struct because every create site supplies a different
/// subset; the orchestrator reads all of them.
pub(crate) struct CreateRequest {
    pub type_name: String,
    pub space: Option<Rc<Space>>,
    pub pos: Position,
    pub entity_id: Option<EntityId>,
    pub data: Option<AttrMap>,
    pub timer_data: Option<Vec<u8>>,
    pub client: Option<GameClient>,
    pub cause: CreateCause,
}

/// The in-process registry, lifecycle manager, and directory for entities
/// resident on this game server.
pub struct EntityCore {
    registry: RefCell<HashMap<String, Rc<EntityTypeDesc>>>,
    entities: RefCell<HashMap<EntityId, Rc<Entity>>>,
    owner_of_client: RefCell<HashMap<ClientId, EntityId>>,
    pub(crate) services: RefCell<HashMap<String, BTreeSet<EntityId>>>,
    dispatcher: Rc<dyn Dispatcher>,
    storage: Rc<dyn Storage>,
    spaces: Rc<SpaceManager>,
    tasks: Rc<dyn TaskSpawner>,
    config: CoreConfig,
}

impl EntityCore {
    /// Start configuring an entity core.
    pub fn builder() -> CoreBuilder {
        CoreBuilder::new()
    }

    pub(crate) fn new(
        dispatcher: Rc<dyn Dispatcher>,
        storage: Rc<dyn Storage>,
        tasks: Rc<dyn TaskSpawner>,
        config: CoreConfig,
    ) -> Rc<Self> {
        Rc::new(Self {
            registry: RefCell::new(HashMap::new()),
            entities: RefCell::new(HashMap::new()),
            owner_of_client: RefCell::new(HashMap::new()),
            services: RefCell::new(HashMap::new()),
            dispatcher,
            storage,
            spaces: Rc::new(SpaceManager::new()),
            tasks,
            config,
        })
    }

    pub(crate) fn dispatcher(&self) -> &Rc<dyn Dispatcher> {
        &self.dispatcher
    }

    pub(crate) fn storage(&self) -> &Rc<dyn Storage> {
        &self.storage
    }

    pub(crate) fn tasks(&self) -> &Rc<dyn TaskSpawner> {
        &self.tasks
    }

    pub(crate) fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// The space surface this core consumes.
    pub fn spaces(&self) -> &Rc<SpaceManager> {
        &self.spaces
    }

    // ---- type registry ----

    /// Register an entity type.
    ///
    /// Panics on duplicate registration: a type registered twice is a
    /// program-load defect, and admitting it would leave peers disagreeing
    /// about the type's schema. Returns the descriptor so the caller can
    /// classify attributes with
    /// [`define_attrs`](EntityTypeDesc::define_attrs).
    pub fn register_entity(&self, type_name: &str, prototype: EntityPrototype) -> Rc<EntityTypeDesc> {
        let mut registry = self.registry.borrow_mut();
        if registry.contains_key(type_name) {
            panic!("entity type {type_name:?} already registered");
        }
        let desc = Rc::new(EntityTypeDesc::from_prototype(type_name, prototype));
        registry.insert(type_name.to_string(), desc.clone());
        tracing::debug!(type_name, "registered entity type");
        desc
    }

    // ---- entity table ----

    /// Look up a resident entity.
    pub fn get_entity(&self, entity_id: &EntityId) -> Option<Rc<Entity>> {
        self.entities.borrow().get(entity_id).cloned()
    }

    /// Snapshot of the resident set.
    pub fn entities(&self) -> Vec<Rc<Entity>> {
        self.entities.borrow().values().cloned().collect()
    }

    /// Number of resident entities.
    pub fn entity_count(&self) -> usize {
        self.entities.borrow().len()
    }

    pub(crate) fn remove_entity(&self, entity_id: &EntityId) {
        self.entities.borrow_mut().remove(entity_id);
    }

    /// Ids of every currently resident entity. Sweeps iterate this and
    /// re-resolve each id so an entity removed mid-sweep is not visited.
    fn resident_ids(&self) -> Vec<EntityId> {
        self.entities.borrow().keys().cloned().collect()
    }

    // ---- lifecycle orchestration ----

    /// Create an entity on this server with cause `Create` and no space.
    pub fn create_entity_locally(
        self: &Rc<Self>,
        type_name: &str,
        data: Option<AttrMap>,
        client: Option<GameClient>,
    ) -> EntityId {
        self.create_entity(CreateRequest {
            type_name: type_name.to_string(),
            space: None,
            pos: Position::default(),
            entity_id: None,
            data,
            timer_data: None,
            client,
            cause: CreateCause::Create,
        })
    }

    /// Ask the dispatcher to create an entity on any suitable server.
    pub fn create_entity_anywhere(&self, type_name: &str) {
        self.dispatcher.send_create_entity_anywhere(type_name, None);
    }

    /// Load an entity from storage and create it here.
    ///
    /// The load runs as a spawned task; its completion executes back on the
    /// main loop. A failed load (error or missing record) tells the
    /// dispatcher to forget the id and never touches the table.
    pub fn load_entity_locally(self: &Rc<Self>, type_name: &str, entity_id: EntityId) {
        self.load_entity(type_name, entity_id, None, Position::default());
    }

    /// Ask the dispatcher to load an entity on any suitable server.
    pub fn load_entity_anywhere(&self, type_name: &str, entity_id: &EntityId) {
        self.dispatcher.send_load_entity_anywhere(type_name, entity_id);
    }

    pub(crate) fn load_entity(
        self: &Rc<Self>,
        type_name: &str,
        entity_id: EntityId,
        space: Option<Rc<Space>>,
        pos: Position,
    ) {
        let core = self.clone();
        let type_name = type_name.to_string();
        self.tasks.spawn(
            "entity_load",
            Box::pin(async move {
                let data = match core.storage.load(&type_name, &entity_id).await {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::error!(%entity_id, %type_name, "no stored record for entity");
                        core.dispatcher.send_notify_destroy_entity(&entity_id);
                        return;
                    }
                    Err(err) => {
                        tracing::error!(%entity_id, %type_name, %err, "entity load failed");
                        core.dispatcher.send_notify_destroy_entity(&entity_id);
                        return;
                    }
                };

                // The target space may have died while the load was in
                // flight; the creation is cancelled, not redirected.
                if space.as_ref().is_some_and(|space| space.is_destroyed()) {
                    core.dispatcher.send_notify_destroy_entity(&entity_id);
                    return;
                }

                core.create_entity(CreateRequest {
                    type_name,
                    space,
                    pos,
                    entity_id: Some(entity_id),
                    data: Some(data),
                    timer_data: None,
                    client: None,
                    cause: CreateCause::Create,
                });
            }),
        );
    }

    /// Inbound-migration ingress: materialize an entity arriving from a
    /// peer server.
    ///
    /// The dispatcher orchestrated the move and already knows the new
    /// location, so no creation notification goes out, and a supplied
    /// client is bound quietly.
    #[allow(clippy::too_many_arguments)]
    pub fn migrate_entity_in(
        self: &Rc<Self>,
        type_name: &str,
        entity_id: EntityId,
        space_id: Option<&EntityId>,
        pos: Position,
        data: AttrMap,
        timer_data: Option<Vec<u8>>,
        client: Option<GameClient>,
    ) -> EntityId {
        let space = space_id.and_then(|space_id| self.spaces.get_space(space_id));
        self.create_entity(CreateRequest {
            type_name: type_name.to_string(),
            space,
            pos,
            entity_id: Some(entity_id),
            data: Some(data),
            timer_data,
            client,
            cause: CreateCause::Migrate,
        })
    }

    /// Materialize an entity on this server.
    ///
    /// This is the single path every create-cause goes through. The step
    /// ordering is contractual: table insertion precedes state
    /// materialization, the dispatcher notification precedes client
    /// binding, the cause callback runs exactly once before space entry.
    pub(crate) fn create_entity(self: &Rc<Self>, req: CreateRequest) -> EntityId {
        let desc = self
            .registry
            .borrow()
            .get(&req.type_name)
            .cloned()
            .unwrap_or_else(|| panic!("unknown entity type: {}", req.type_name));

        let entity_id = req.entity_id.unwrap_or_else(EntityId::generate);

        let behavior = desc.instantiate();
        let entity = Rc::new(Entity::new(
            &req.type_name,
            entity_id.clone(),
            desc,
            behavior,
            Rc::downgrade(self),
        ));
        entity.set_space(self.spaces.nil_space());

        if self
            .entities
            .borrow_mut()
            .insert(entity_id.clone(), entity.clone())
            .is_some()
        {
            tracing::warn!(%entity_id, "entity id already resident; replacing");
        }

        let had_data = req.data.is_some();
        match req.data {
            Some(data) if req.cause == CreateCause::Create => {
                entity.with_behavior(|b| b.load_persistent_data(&entity, data));
            }
            Some(data) => {
                entity.with_behavior(|b| b.load_migrate_data(&entity, data));
            }
            None => {}
        }
        entity.cache_persistence();
        if !had_data {
            // The record must exist in storage before any later event can
            // refer to this entity.
            entity.save();
        }

        if entity.is_space_entity() {
            let space = Rc::new(Space::new(entity_id.clone(), entity.space_kind()));
            self.spaces.register(space);
        }

        if let Some(timer_data) = req.timer_data {
            entity.restore_timers(timer_data);
        }

        if entity.is_persistent() {
            entity.setup_save_timer(self);
        }

        if req.cause.notifies_dispatcher() {
            self.dispatcher.send_notify_create_entity(&entity_id);
        }

        if let Some(client) = req.client {
            if req.cause.binds_quietly() {
                entity.bind_client_quietly(self, client);
            } else {
                entity.set_client(Some(client));
            }
        }

        tracing::debug!(entity = %entity, cause = ?req.cause, "entity created");
        run_panicless(req.cause.callback_name(), || {
            entity.with_behavior(|b| match req.cause {
                CreateCause::Create => b.on_created(&entity),
                CreateCause::Migrate => b.on_migrate_in(&entity),
                CreateCause::Restore => b.on_restored(&entity),
            });
        });

        if let Some(space) = req.space {
            entity.enter_space_direct(&space, req.pos, req.cause.is_restore());
        }

        entity_id
    }

    // ---- client ownership index ----

    pub(crate) fn on_entity_get_client(&self, entity_id: &EntityId, client_id: &ClientId) {
        self.owner_of_client
            .borrow_mut()
            .insert(client_id.clone(), entity_id.clone());
    }

    pub(crate) fn on_entity_lose_client(&self, client_id: &ClientId) {
        self.owner_of_client.borrow_mut().remove(client_id);
    }

    pub(crate) fn owner_of_client(&self, client_id: &ClientId) -> Option<EntityId> {
        self.owner_of_client.borrow().get(client_id).cloned()
    }

    /// A client session went away; tear down its binding and tell the
    /// owning entity.
    ///
    /// An unowned client id is tolerated: an explicit unbind can race the
    /// disconnect event inside the same pump.
    pub fn on_client_disconnected(&self, client_id: &ClientId) {
        let owner_id = self.owner_of_client(client_id);
        match owner_id {
            Some(owner_id) => {
                self.on_entity_lose_client(client_id);
                if let Some(owner) = self.get_entity(&owner_id) {
                    owner.notify_client_disconnected();
                }
            }
            None => {
                tracing::warn!(%client_id, "disconnect for client with no owning entity");
            }
        }
    }

    /// A gate went down, taking every client session it hosted with it.
    ///
    /// Visits each resident entity once; entities reacting by mutating
    /// their own binding (or destroying themselves) are safe because the
    /// sweep re-resolves each id before touching it.
    pub fn on_gate_disconnected(&self, gate_id: GateId) {
        tracing::warn!(gate_id, "gate disconnected");
        for entity_id in self.resident_ids() {
            let Some(entity) = self.get_entity(&entity_id) else {
                continue;
            };
            if let Some(client) = entity.client() {
                if client.gate_id == gate_id {
                    self.on_entity_lose_client(&client.client_id);
                    entity.notify_client_disconnected();
                }
            }
        }
    }

    /// Movement ingress from a client, forwarded to the owning entity.
    /// Silently drops when the entity has been destroyed since the client's
    /// last send.
    pub fn on_sync_position_yaw_from_client(
        &self,
        entity_id: &EntityId,
        x: f32,
        y: f32,
        z: f32,
        yaw: Yaw,
    ) {
        let Some(entity) = self.get_entity(entity_id) else {
            tracing::warn!(%entity_id, "position sync for absent entity");
            return;
        };
        entity.sync_position_yaw_from_client(x, y, z, yaw);
    }

    // ---- service directory ----

    /// Record an entity as a provider of a named service.
    ///
    /// Called both for local declarations and for peer declarations the
    /// dispatcher delivers; the directory holds the cluster-wide view.
    pub fn declare_service(&self, service: &str, entity_id: EntityId) {
        self.services
            .borrow_mut()
            .entry(service.to_string())
            .or_default()
            .insert(entity_id);
    }

    /// Remove a provider; the last removal drops the service entirely.
    pub fn undeclare_service(&self, service: &str, entity_id: &EntityId) {
        let mut services = self.services.borrow_mut();
        if let Some(providers) = services.get_mut(service) {
            providers.remove(entity_id);
            if providers.is_empty() {
                services.remove(service);
            }
        }
    }

    /// Current providers of a service; empty for an unknown service.
    pub fn service_providers(&self, service: &str) -> BTreeSet<EntityId> {
        self.services
            .borrow()
            .get(service)
            .cloned()
            .unwrap_or_default()
    }

    /// Pick one provider of a service uniformly at random.
    ///
    /// Panics on an unknown service: the caller is about to direct a call
    /// into nothing, and failing loudly beats dropping it silently.
    pub fn choose_service_provider(&self, service: &str) -> EntityId {
        let services = self.services.borrow();
        let Some(providers) = services.get(service) else {
            panic!("service not found: {service}");
        };
        let index = rand::thread_rng().gen_range(0..providers.len());
        providers
            .iter()
            .nth(index)
            .cloned()
            .expect("provider sets are never empty")
    }

    pub(crate) fn undeclare_all_services_of(&self, entity_id: &EntityId) {
        let mut services = self.services.borrow_mut();
        services.retain(|_, providers| {
            providers.remove(entity_id);
            !providers.is_empty()
        });
    }

    // ---- call router ----

    /// Invoke a method on an entity, wherever it lives.
    ///
    /// Always routed through the dispatcher, even for a local target: one
    /// message-ordering discipline, and a target migrating mid-call is the
    /// dispatcher's problem, not ours.
    pub fn call_entity(&self, entity_id: &EntityId, method: &str, args: &[Value]) {
        self.dispatcher.send_call_entity_method(entity_id, method, args);
    }

    /// RPC ingress for a local entity. A miss means the call raced a
    /// destroy; log and drop.
    pub fn on_call(
        &self,
        entity_id: &EntityId,
        method: &str,
        raw_args: &[Vec<u8>],
        client_id: Option<ClientId>,
    ) {
        let Some(entity) = self.get_entity(entity_id) else {
            tracing::error!(%entity_id, method, "call for absent entity");
            return;
        };
        entity.on_call_from_remote(method, raw_args, client_id);
    }

    // ---- batch lifecycle ----

    /// Save every resident persistent entity.
    pub fn save_all_entities(&self) {
        for entity_id in self.resident_ids() {
            if let Some(entity) = self.get_entity(&entity_id) {
                entity.save();
            }
        }
    }

    /// Destroy every resident entity; the server is going down.
    pub fn on_game_terminating(&self) {
        tracing::info!(count = self.entity_count(), "destroying all entities for shutdown");
        for entity_id in self.resident_ids() {
            if let Some(entity) = self.get_entity(&entity_id) {
                entity.destroy();
            }
        }
    }
}
