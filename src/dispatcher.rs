//! Send surface of the central dispatcher.
//!
//! The dispatcher is the external coordinator that routes cross-process
//! events and RPCs. The entity core only ever *sends* to it; inbound
//! dispatcher traffic arrives through the core's event entry points. All
//! sends are non-blocking.

use crate::entity::{AttrMap, EntityId};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::VecDeque;

/// Outbound messages the entity core can hand to the dispatcher.
pub trait Dispatcher {
    /// Announce a newly resident entity so peers learn its location.
    fn send_notify_create_entity(&self, entity_id: &EntityId);

    /// Announce that an entity is gone so peers forget its location.
    fn send_notify_destroy_entity(&self, entity_id: &EntityId);

    /// Route a method invocation to wherever the target entity lives.
    fn send_call_entity_method(&self, entity_id: &EntityId, method: &str, args: &[Value]);

    /// Ask the dispatcher to load an entity on any suitable server.
    fn send_load_entity_anywhere(&self, type_name: &str, entity_id: &EntityId);

    /// Ask the dispatcher to create an entity on any suitable server.
    fn send_create_entity_anywhere(&self, type_name: &str, data: Option<&AttrMap>);
}

/// One buffered dispatcher send.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatcherMessage {
    NotifyCreateEntity(EntityId),
    NotifyDestroyEntity(EntityId),
    CallEntityMethod {
        entity_id: EntityId,
        method: String,
        args: Vec<Value>,
    },
    LoadEntityAnywhere {
        type_name: String,
        entity_id: EntityId,
    },
    CreateEntityAnywhere {
        type_name: String,
        data: Option<AttrMap>,
    },
}

/// Dispatcher that buffers sends in memory.
///
/// The production transport drains the buffer onto the wire; tests assert
/// on it directly. Sends never block and never fail.
#[derive(Default)]
pub struct BufferedDispatcher {
    outbox: RefCell<VecDeque<DispatcherMessage>>,
}

impl BufferedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything buffered so far, oldest first.
    pub fn drain(&self) -> Vec<DispatcherMessage> {
        self.outbox.borrow_mut().drain(..).collect()
    }

    /// Snapshot of the buffered sends without consuming them.
    pub fn sent(&self) -> Vec<DispatcherMessage> {
        self.outbox.borrow().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.outbox.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.outbox.borrow().is_empty()
    }

    fn push(&self, message: DispatcherMessage) {
        self.outbox.borrow_mut().push_back(message);
    }
}

impl Dispatcher for BufferedDispatcher {
    fn send_notify_create_entity(&self, entity_id: &EntityId) {
        self.push(DispatcherMessage::NotifyCreateEntity(entity_id.clone()));
    }

    fn send_notify_destroy_entity(&self, entity_id: &EntityId) {
        self.push(DispatcherMessage::NotifyDestroyEntity(entity_id.clone()));
    }

    fn send_call_entity_method(&self, entity_id: &EntityId, method: &str, args: &[Value]) {
        self.push(DispatcherMessage::CallEntityMethod {
            entity_id: entity_id.clone(),
            method: method.to_string(),
            args: args.to_vec(),
        });
    }

    fn send_load_entity_anywhere(&self, type_name: &str, entity_id: &EntityId) {
        self.push(DispatcherMessage::LoadEntityAnywhere {
            type_name: type_name.to_string(),
            entity_id: entity_id.clone(),
        });
    }

    fn send_create_entity_anywhere(&self, type_name: &str, data: Option<&AttrMap>) {
        self.push(DispatcherMessage::CreateEntityAnywhere {
            type_name: type_name.to_string(),
            data: data.cloned(),
        });
    }
}
