//! WebSocket transport: connections, frame handling, session lifecycle.

pub mod connection;
pub mod handler;
pub mod registry;
pub mod session;
