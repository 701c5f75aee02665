//! # wsubus-core
//!
//! Shared vocabulary for the wsubus bridge:
//!
//! - **Bus**: the [`Bus`] trait the bridge consumes, plus [`LocalBus`], an
//!   in-process implementation
//! - **Signatures**: [`ArgKind`], [`MethodSignature`], [`ObjectSignature`]
//! - **Status codes**: [`BusStatus`] as carried in `result[0]` on the wire
//! - **Call multiplexing**: [`CallSlots`], the bounded in-flight call table
//! - **Access control**: the async [`AccessPolicy`] gate applied to events
//! - **IDs**: branded connection and session identifiers

#![deny(unsafe_code)]

pub mod access;
pub mod bus;
pub mod errors;
pub mod ids;
pub mod local;
pub mod multiplexer;
pub mod pattern;
pub mod signature;
pub mod status;

pub use access::{AccessPolicy, AccessRule, AllowAll, DenyAll, StaticAcl};
pub use bus::{
    Bus, BusCall, BusEvent, CallReply, DeferredReply, EventHandler, HandlerId, ObjectHandler,
    ObjectInfo,
};
pub use errors::{BusError, SignatureError};
pub use ids::{ConnectionId, DEFAULT_SESSION_ID, SessionToken};
pub use local::{LocalBus, OBJECT_ADD_EVENT, OBJECT_REMOVE_EVENT};
pub use multiplexer::{CallSlots, MAX_INFLIGHT, SlotsExhausted};
pub use pattern::pattern_matches;
pub use signature::{ArgKind, MethodSignature, ObjectSignature, ObjectSignatureBuilder};
pub use status::BusStatus;
