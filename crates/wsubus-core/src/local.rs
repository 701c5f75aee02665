//! In-process bus.
//!
//! [`LocalBus`] keeps its object and handler tables behind one
//! `parking_lot::RwLock`. Handlers (object and event) are always invoked
//! after the lock is released, so a handler may call back into the bus.
//!
//! Registering or removing an object emits `ubus.object.add` /
//! `ubus.object.remove` with `{"id", "path"}`, the lifecycle events
//! federation peers listen for.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value, json};
use tracing::{debug, trace};

use crate::bus::{
    Bus, BusCall, BusEvent, CallReply, DeferredReply, EventHandler, HandlerId, ObjectHandler,
    ObjectInfo,
};
use crate::errors::BusError;
use crate::pattern::pattern_matches;
use crate::signature::ObjectSignature;
use crate::status::BusStatus;

/// Event emitted after an object is registered.
pub const OBJECT_ADD_EVENT: &str = "ubus.object.add";
/// Event emitted after an object is removed.
pub const OBJECT_REMOVE_EVENT: &str = "ubus.object.remove";

struct ObjectEntry {
    id: u32,
    signature: ObjectSignature,
    handler: Arc<dyn ObjectHandler>,
}

struct HandlerEntry {
    id: HandlerId,
    pattern: String,
    handler: Arc<dyn EventHandler>,
}

#[derive(Default)]
struct Tables {
    objects: BTreeMap<String, ObjectEntry>,
    handlers: Vec<HandlerEntry>,
    next_object_id: u32,
    next_handler_id: u64,
}

/// An in-memory [`Bus`].
#[derive(Default)]
pub struct LocalBus {
    tables: RwLock<Tables>,
}

impl LocalBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered objects.
    pub fn object_count(&self) -> usize {
        self.tables.read().objects.len()
    }

    /// Number of registered event handlers.
    pub fn handler_count(&self) -> usize {
        self.tables.read().handlers.len()
    }

    /// Whether an object with this exact name is registered.
    pub fn has_object(&self, name: &str) -> bool {
        self.tables.read().objects.contains_key(name)
    }

    fn dispatch_event(&self, event: &BusEvent) {
        let targets: Vec<Arc<dyn EventHandler>> = self
            .tables
            .read()
            .handlers
            .iter()
            .filter(|h| pattern_matches(&h.pattern, &event.event_type))
            .map(|h| Arc::clone(&h.handler))
            .collect();

        trace!(event = %event.event_type, handlers = targets.len(), "dispatching bus event");
        for handler in targets {
            handler.on_event(event);
        }
    }

    fn lifecycle_event(&self, event_type: &str, id: u32, path: &str) {
        let Value::Object(data) = json!({ "id": id, "path": path }) else {
            return;
        };
        self.dispatch_event(&BusEvent {
            event_type: event_type.to_owned(),
            data,
        });
    }
}

#[async_trait]
impl Bus for LocalBus {
    fn add_object(
        &self,
        name: &str,
        signature: ObjectSignature,
        handler: Arc<dyn ObjectHandler>,
    ) -> Result<u32, BusError> {
        let id = {
            let mut tables = self.tables.write();
            if tables.objects.contains_key(name) {
                return Err(BusError::AlreadyRegistered(name.to_owned()));
            }
            tables.next_object_id += 1;
            let id = tables.next_object_id;
            let _ = tables.objects.insert(
                name.to_owned(),
                ObjectEntry {
                    id,
                    signature,
                    handler,
                },
            );
            id
        };
        debug!(object = name, id, "object registered");
        self.lifecycle_event(OBJECT_ADD_EVENT, id, name);
        Ok(id)
    }

    fn remove_object(&self, name: &str) -> Result<(), BusError> {
        let removed = self.tables.write().objects.remove(name);
        let Some(entry) = removed else {
            return Err(BusError::ObjectNotFound(name.to_owned()));
        };
        debug!(object = name, id = entry.id, "object removed");
        self.lifecycle_event(OBJECT_REMOVE_EVENT, entry.id, name);
        Ok(())
    }

    fn lookup(&self, pattern: &str) -> Vec<ObjectInfo> {
        self.tables
            .read()
            .objects
            .iter()
            .filter(|(path, _)| pattern_matches(pattern, path))
            .map(|(path, entry)| ObjectInfo {
                path: path.clone(),
                id: entry.id,
                signature: entry.signature.clone(),
            })
            .collect()
    }

    async fn invoke(&self, call: BusCall) -> Result<CallReply, BusError> {
        let handler = {
            let tables = self.tables.read();
            let entry = tables
                .objects
                .get(&call.object)
                .ok_or_else(|| BusError::ObjectNotFound(call.object.clone()))?;
            let method = entry.signature.method(&call.method).ok_or_else(|| {
                BusError::MethodNotFound {
                    object: call.object.clone(),
                    method: call.method.clone(),
                }
            })?;
            let mistyped = call.args.iter().any(|(name, value)| {
                method
                    .arg_kind(name)
                    .is_some_and(|kind| !kind.accepts(value))
            });
            if mistyped {
                return Ok(CallReply::status(BusStatus::InvalidArgument));
            }
            Arc::clone(&entry.handler)
        };

        let (reply, rx) = DeferredReply::channel();
        handler.handle(call, reply);
        rx.await.map_err(|_| BusError::Abandoned)
    }

    fn register_event_handler(
        &self,
        pattern: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<HandlerId, BusError> {
        let mut tables = self.tables.write();
        tables.next_handler_id += 1;
        let id = HandlerId(tables.next_handler_id);
        tables.handlers.push(HandlerEntry {
            id,
            pattern: pattern.to_owned(),
            handler,
        });
        Ok(id)
    }

    fn unregister_event_handler(&self, id: HandlerId) -> Result<(), BusError> {
        let mut tables = self.tables.write();
        let before = tables.handlers.len();
        tables.handlers.retain(|h| h.id != id);
        if tables.handlers.len() == before {
            return Err(BusError::HandlerNotFound(id.0));
        }
        Ok(())
    }

    fn send_event(&self, event_type: &str, data: Map<String, Value>) -> Result<(), BusError> {
        self.dispatch_event(&BusEvent {
            event_type: event_type.to_owned(),
            data,
        });
        Ok(())
    }
}
