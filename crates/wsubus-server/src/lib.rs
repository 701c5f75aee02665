//! # wsubus-server
//!
//! Axum server exposing a [`Bus`](wsubus_core::Bus) to WebSocket clients
//! over JSON-RPC 2.0.
//!
//! - [`server`]: router, `/ws` upgrade, `/health`, `/metrics`
//! - [`websocket`]: per-connection state and the read/write loops
//! - [`dispatch`]: command execution, including asynchronous `call`
//! - [`subscription`]: event subscriptions and the access-check gate
//! - [`session_object`]: the built-in `session.login` object

#![deny(unsafe_code)]

pub mod config;
pub mod context;
pub mod dispatch;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod session_object;
pub mod shutdown;
pub mod subscription;
mod timeout;
pub mod websocket;

pub use config::ServerConfig;
pub use context::ServerContext;
pub use errors::SubscriptionError;
pub use server::{WS_SUBPROTOCOL, WsubusServer};
pub use session_object::SessionObject;
pub use shutdown::ShutdownCoordinator;
pub use subscription::SubscriptionEngine;
