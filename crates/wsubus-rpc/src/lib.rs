//! # wsubus-rpc
//!
//! JSON-RPC 2.0 protocol layer shared by the server and the federation
//! client:
//!
//! - [`types`]: request, response, and event-notification wire types
//! - [`errors`]: JSON-RPC error codes and [`RpcError`]
//! - [`envelope`]: strict envelope validation with distinct failure reasons
//! - [`command`]: typed [`Command`] values for the seven supported methods

#![deny(unsafe_code)]

pub mod command;
pub mod envelope;
pub mod errors;
pub mod types;

pub use command::{Command, ParsedRequest, SUPPORTED_METHODS, parse_command};
pub use envelope::{RequestError, parse_request};
pub use errors::{InvalidRequestReason, RpcError};
pub use types::{
    EventNotification, EventParams, JSONRPC_VERSION, RpcErrorBody, RpcRequest, RpcResponse,
    SubscriptionRef,
};
