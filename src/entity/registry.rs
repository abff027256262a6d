//! Entity type registry: descriptors, attribute classification, RPC tables.
//!
//! Each entity type registers once at process startup with an
//! [`EntityPrototype`]: a factory for its behavior plus an explicit table of
//! RPC methods. Registration problems (duplicate type, duplicate method,
//! unknown attribute tag) are program-load defects with no safe recovery,
//! so they panic instead of surfacing as runtime errors that would silently
//! admit inconsistent cluster state.

use crate::entity::entity::Entity;
use crate::entity::traits::EntityBehavior;
use crate::entity::ClientId;
use crate::error::EntityError;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

/// Invoker for one RPC method: receives the entity's behavior, the entity,
/// the decoded argument list, and the calling client (if the call came
/// through a client connection).
pub type RpcInvoker =
    Box<dyn Fn(&mut dyn EntityBehavior, &Entity, Vec<Value>, Option<ClientId>) -> Result<(), EntityError>>;

/// One entry of an entity type's RPC method table.
///
/// This is the capability-table replacement for method-table reflection:
/// the user names each callable method and supplies the closure that
/// downcasts the behavior, decodes arguments, and invokes it.
pub struct RpcMethod {
    name: String,
    invoker: RpcInvoker,
}

impl RpcMethod {
    pub fn new<F>(name: impl Into<String>, invoker: F) -> Self
    where
        F: Fn(&mut dyn EntityBehavior, &Entity, Vec<Value>, Option<ClientId>) -> Result<(), EntityError>
            + 'static,
    {
        Self {
            name: name.into(),
            invoker: Box::new(invoker),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn invoke(
        &self,
        behavior: &mut dyn EntityBehavior,
        entity: &Entity,
        args: Vec<Value>,
        client_id: Option<ClientId>,
    ) -> Result<(), EntityError> {
        (self.invoker)(behavior, entity, args, client_id)
    }
}

impl std::fmt::Debug for RpcMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcMethod").field("name", &self.name).finish()
    }
}

/// Lookup of RPC descriptors keyed by method name.
#[derive(Debug, Default)]
pub(crate) struct RpcDescMap {
    methods: HashMap<String, RpcMethod>,
}

impl RpcDescMap {
    /// Install one method descriptor. Each method is visited exactly once
    /// per type; a duplicate name is a registration bug.
    fn visit(&mut self, method: RpcMethod) {
        let name = method.name.clone();
        if self.methods.insert(name.clone(), method).is_some() {
            panic!("RPC method {name:?} registered twice for the same entity type");
        }
    }

    fn get(&self, name: &str) -> Option<&RpcMethod> {
        self.methods.get(name)
    }
}

/// Registration-time description of a user entity type: the behavior
/// factory plus its RPC method table.
pub struct EntityPrototype {
    factory: Box<dyn Fn() -> Box<dyn EntityBehavior>>,
    methods: Vec<RpcMethod>,
}

impl EntityPrototype {
    /// Create a prototype from a behavior factory.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let prototype = EntityPrototype::new(|| Player::default())
    ///     .with_method(RpcMethod::new("say", |behavior, entity, args, _client| {
    ///         let text: String = serde_json::from_value(args[0].clone())?;
    ///         // ...
    ///         Ok(())
    ///     }));
    /// core.register_entity("Player", prototype);
    /// ```
    pub fn new<B, F>(factory: F) -> Self
    where
        B: EntityBehavior,
        F: Fn() -> B + 'static,
    {
        Self {
            factory: Box::new(move || Box::new(factory())),
            methods: Vec::new(),
        }
    }

    /// Add one RPC method to the prototype's table.
    pub fn with_method(mut self, method: RpcMethod) -> Self {
        self.methods.push(method);
        self
    }
}

/// Descriptor of a registered entity type.
///
/// Holds the behavior factory, the RPC table, and the three attribute
/// classification sets. The sets start empty and are populated through
/// [`EntityTypeDesc::define_attrs`]; an attribute tagged for all clients is
/// always also visible to the owning client, so `all_client_attrs` is a
/// subset of `client_attrs` by construction.
pub struct EntityTypeDesc {
    type_name: String,
    factory: Box<dyn Fn() -> Box<dyn EntityBehavior>>,
    rpc_descs: RpcDescMap,
    client_attrs: RefCell<HashSet<String>>,
    all_client_attrs: RefCell<HashSet<String>>,
    persistent_attrs: RefCell<HashSet<String>>,
    /// Set once the first entity of this type is instantiated; attribute
    /// re-classification is forbidden from then on.
    instantiated: Cell<bool>,
}

impl EntityTypeDesc {
    pub(crate) fn from_prototype(type_name: &str, prototype: EntityPrototype) -> Self {
        let mut rpc_descs = RpcDescMap::default();
        for method in prototype.methods {
            rpc_descs.visit(method);
        }

        Self {
            type_name: type_name.to_string(),
            factory: prototype.factory,
            rpc_descs,
            client_attrs: RefCell::new(HashSet::new()),
            all_client_attrs: RefCell::new(HashSet::new()),
            persistent_attrs: RefCell::new(HashSet::new()),
            instantiated: Cell::new(false),
        }
    }

    /// Classify attributes by tag.
    ///
    /// Tags are case-insensitive and drawn from the closed set `client`,
    /// `allclients`, `persistent`. An unknown tag panics. Calling this again
    /// with identical input is a no-op; re-classification is allowed while
    /// the process is still wiring types up, but panics once an entity of
    /// this type exists.
    pub fn define_attrs(&self, attr_defs: &[(&str, &[&str])]) {
        if self.instantiated.get() {
            panic!(
                "cannot re-classify attributes of {:?} after entities of that type exist",
                self.type_name
            );
        }

        for (attr, tags) in attr_defs {
            let mut is_all_clients = false;
            let mut is_client = false;
            let mut is_persistent = false;

            for tag in *tags {
                match tag.to_ascii_lowercase().as_str() {
                    "allclients" => {
                        is_all_clients = true;
                        is_client = true;
                    }
                    "client" => is_client = true,
                    "persistent" => is_persistent = true,
                    other => panic!(
                        "attribute {attr}: invalid tag {other:?}; valid tags: client, allclients, persistent"
                    ),
                }
            }

            if is_all_clients {
                self.all_client_attrs.borrow_mut().insert(attr.to_string());
            }
            if is_client {
                self.client_attrs.borrow_mut().insert(attr.to_string());
            }
            if is_persistent {
                self.persistent_attrs.borrow_mut().insert(attr.to_string());
            }
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Attributes visible to the owning client.
    pub fn client_attrs(&self) -> HashSet<String> {
        self.client_attrs.borrow().clone()
    }

    /// Attributes visible to every client in the same space.
    pub fn all_client_attrs(&self) -> HashSet<String> {
        self.all_client_attrs.borrow().clone()
    }

    /// Attributes written to storage on save.
    pub fn persistent_attrs(&self) -> HashSet<String> {
        self.persistent_attrs.borrow().clone()
    }

    pub(crate) fn is_persistent_attr(&self, name: &str) -> bool {
        self.persistent_attrs.borrow().contains(name)
    }

    /// Build a fresh behavior instance and latch the descriptor against
    /// further attribute re-classification.
    pub(crate) fn instantiate(&self) -> Box<dyn EntityBehavior> {
        self.instantiated.set(true);
        (self.factory)()
    }

    pub(crate) fn rpc_desc(&self, name: &str) -> Option<&RpcMethod> {
        self.rpc_descs.get(name)
    }
}

impl std::fmt::Debug for EntityTypeDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityTypeDesc")
            .field("type_name", &self.type_name)
            .field("rpc_descs", &self.rpc_descs)
            .finish()
    }
}
