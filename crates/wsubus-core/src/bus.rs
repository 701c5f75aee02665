//! The bus collaborator surface.
//!
//! The bridge never talks to a concrete bus directly. It registers objects,
//! invokes methods, and listens for events through [`Bus`]. Object
//! handlers answer through a [`DeferredReply`], a one-shot completion handle
//! that may be resolved immediately or long after the handler returned.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::oneshot;

use crate::errors::BusError;
use crate::signature::ObjectSignature;
use crate::status::BusStatus;

/// An inbound method invocation delivered to an [`ObjectHandler`].
#[derive(Clone, Debug, PartialEq)]
pub struct BusCall {
    /// Name the object is registered under.
    pub object: String,
    /// Method being called.
    pub method: String,
    /// Named arguments.
    pub args: Map<String, Value>,
}

impl BusCall {
    /// Create a call.
    pub fn new(object: impl Into<String>, method: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            object: object.into(),
            method: method.into(),
            args,
        }
    }
}

/// Completion of a bus call: status plus optional payload.
#[derive(Clone, Debug, PartialEq)]
pub struct CallReply {
    /// Outcome status.
    pub status: BusStatus,
    /// Payload, only meaningful on success.
    pub data: Option<Map<String, Value>>,
}

impl CallReply {
    /// Successful reply carrying a payload.
    pub fn ok(data: Map<String, Value>) -> Self {
        Self {
            status: BusStatus::Ok,
            data: Some(data),
        }
    }

    /// Successful reply with no payload.
    pub fn empty() -> Self {
        Self {
            status: BusStatus::Ok,
            data: None,
        }
    }

    /// Failed reply.
    pub fn status(status: BusStatus) -> Self {
        Self { status, data: None }
    }
}

/// One-shot completion handle for a deferred bus call.
///
/// Completing consumes the handle, so a call can never be answered twice.
/// Dropping it without completing makes the caller see
/// [`BusError::Abandoned`].
#[derive(Debug)]
pub struct DeferredReply {
    tx: oneshot::Sender<CallReply>,
}

impl DeferredReply {
    /// Create a handle and the receiver the caller awaits.
    pub fn channel() -> (Self, oneshot::Receiver<CallReply>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Deliver the reply. Returns `false` if the caller already went away.
    pub fn complete(self, reply: CallReply) -> bool {
        self.tx.send(reply).is_ok()
    }

    /// Shorthand for completing with a bare status.
    pub fn fail(self, status: BusStatus) -> bool {
        self.complete(CallReply::status(status))
    }

    /// Whether the caller has stopped waiting.
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Handler shared by every method of a registered object.
pub trait ObjectHandler: Send + Sync {
    /// Handle one call. The handler owns `reply` and must eventually
    /// complete or drop it.
    fn handle(&self, call: BusCall, reply: DeferredReply);
}

impl<F> ObjectHandler for F
where
    F: Fn(BusCall, DeferredReply) + Send + Sync,
{
    fn handle(&self, call: BusCall, reply: DeferredReply) {
        self(call, reply);
    }
}

/// An event as emitted on the bus.
#[derive(Clone, Debug, PartialEq)]
pub struct BusEvent {
    /// Event type (its name).
    pub event_type: String,
    /// Event payload.
    pub data: Map<String, Value>,
}

/// Receiver of bus events matching a registered pattern.
pub trait EventHandler: Send + Sync {
    /// Called synchronously from the emitting context. The event is only
    /// borrowed; handlers that defer work must copy what they need.
    fn on_event(&self, event: &BusEvent);
}

impl<F> EventHandler for F
where
    F: Fn(&BusEvent) + Send + Sync,
{
    fn on_event(&self, event: &BusEvent) {
        self(event);
    }
}

/// Registration handle of an event handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub u64);

/// An object visible through [`Bus::lookup`].
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectInfo {
    /// Registered name.
    pub path: String,
    /// Numeric object id assigned by the bus.
    pub id: u32,
    /// Method table.
    pub signature: ObjectSignature,
}

/// Capabilities the bridge needs from the system bus.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Register an object. Returns its numeric id.
    fn add_object(
        &self,
        name: &str,
        signature: ObjectSignature,
        handler: Arc<dyn ObjectHandler>,
    ) -> Result<u32, BusError>;

    /// Unregister an object.
    fn remove_object(&self, name: &str) -> Result<(), BusError>;

    /// All objects whose name matches `pattern`, sorted by name.
    fn lookup(&self, pattern: &str) -> Vec<ObjectInfo>;

    /// Invoke a method and wait for its (possibly deferred) reply.
    async fn invoke(&self, call: BusCall) -> Result<CallReply, BusError>;

    /// Register a handler for events whose type matches `pattern`.
    fn register_event_handler(
        &self,
        pattern: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<HandlerId, BusError>;

    /// Remove an event handler.
    fn unregister_event_handler(&self, id: HandlerId) -> Result<(), BusError>;

    /// Emit an event to every matching handler.
    fn send_event(&self, event_type: &str, data: Map<String, Value>) -> Result<(), BusError>;
}
