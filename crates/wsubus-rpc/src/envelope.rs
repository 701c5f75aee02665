//! Inbound envelope validation.
//!
//! The `id` is captured before anything else is checked so that every
//! rejection can still be answered with the caller's id.

use serde_json::Value;

use crate::errors::{InvalidRequestReason, RpcError};
use crate::types::{JSONRPC_VERSION, RpcRequest};

/// A rejected request, carrying the id to echo back.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{error}")]
pub struct RequestError {
    /// Request id, `null` if it could not be recovered.
    pub id: Value,
    /// What went wrong.
    pub error: RpcError,
}

impl RequestError {
    /// Pair an error with a request id.
    pub fn new(id: Value, error: RpcError) -> Self {
        Self { id, error }
    }
}

/// Decode and validate one text frame.
///
/// Checks, in order: valid JSON, object, `jsonrpc` present, `method` is a
/// string, `params` is an array, `jsonrpc == "2.0"`.
pub fn parse_request(text: &str) -> Result<RpcRequest, RequestError> {
    let value: Value = serde_json::from_str(text).map_err(|e| {
        RequestError::new(
            Value::Null,
            RpcError::Parse {
                message: e.to_string(),
            },
        )
    })?;

    let Value::Object(mut obj) = value else {
        return Err(invalid(Value::Null, InvalidRequestReason::NotAnObject));
    };

    let id = obj.remove("id").unwrap_or(Value::Null);

    let Some(version) = obj.remove("jsonrpc") else {
        return Err(invalid(id, InvalidRequestReason::MissingVersion));
    };
    let Some(Value::String(method)) = obj.remove("method") else {
        return Err(invalid(id, InvalidRequestReason::MissingMethod));
    };
    let Some(Value::Array(params)) = obj.remove("params") else {
        return Err(invalid(id, InvalidRequestReason::MissingParams));
    };
    if version.as_str() != Some(JSONRPC_VERSION) {
        return Err(invalid(
            id,
            InvalidRequestReason::VersionMismatch {
                found: version.to_string(),
            },
        ));
    }

    Ok(RpcRequest {
        jsonrpc: JSONRPC_VERSION.to_owned(),
        id,
        method,
        params,
    })
}

fn invalid(id: Value, reason: InvalidRequestReason) -> RequestError {
    RequestError::new(id, RpcError::InvalidRequest { reason })
}
