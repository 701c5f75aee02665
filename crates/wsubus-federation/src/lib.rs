//! # wsubus-federation
//!
//! Client side of bridge-to-bridge federation. A [`FederationClient`]
//! connects to a peer bridge over WebSocket, logs in, subscribes to the
//! peer's events, and mirrors every peer object onto the local bus as a
//! stub named `<peer-host>/<object>`. Calls on a stub travel to the peer
//! and their results come back through the stub's deferred reply.
//!
//! - [`session`]: the login / subscribe / list state machine
//! - [`stubs`]: local proxy objects
//! - [`link`]: the shared, lock-guarded session handle
//! - [`client`]: the socket driver and reconnect loop

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod link;
pub mod session;
pub mod stubs;
pub mod wire;

pub use client::{FederationClient, PeerConfig, WS_SUBPROTOCOL};
pub use errors::FederationError;
pub use link::FederationLink;
pub use session::{Credentials, FederationSession, SessionState};
pub use stubs::{RemoteStub, StubRegistry, qualified_name};
