//! JSON-RPC 2.0 wire types.
//!
//! Results are always arrays: `[code]` on failure, `[0]` or `[0, payload]`
//! on success. Protocol-level failures (bad envelope, unknown method) use
//! the standard `error` member instead.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use wsubus_core::BusStatus;

use crate::errors::RpcError;

/// The only protocol version accepted.
pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC request. Used to build outbound requests and as the
/// validated form of inbound ones.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Request identifier, echoed in the response. Any JSON value.
    pub id: Value,
    /// Method name.
    pub method: String,
    /// Positional parameters.
    pub params: Vec<Value>,
}

impl RpcRequest {
    /// Build a request.
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Echoed request identifier (`null` when unknown).
    pub id: Value,
    /// `[code, payload?]` for handled requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Protocol-level failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

/// The `error` member of a response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorBody {
    /// Numeric JSON-RPC error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcResponse {
    /// Build a `result` response. The payload is only included on success.
    pub fn status(id: Value, status: BusStatus, payload: Option<Value>) -> Self {
        let mut result = vec![Value::from(status.code())];
        if status.is_ok() {
            result.extend(payload);
        }
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: Some(Value::Array(result)),
            error: None,
        }
    }

    /// Successful `result` response carrying a payload.
    pub fn ok(id: Value, payload: Value) -> Self {
        Self::status(id, BusStatus::Ok, Some(payload))
    }

    /// Build an `error` response.
    pub fn error(id: Value, err: &RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: None,
            error: Some(err.to_error_body()),
        }
    }

    /// Status code of a `result` response, if any.
    pub fn result_code(&self) -> Option<i64> {
        self.result.as_ref()?.get(0)?.as_i64()
    }
}

/// Subscription identity attached to every forwarded event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRef {
    /// Pattern the client subscribed with.
    pub pattern: String,
    /// Subscription id.
    pub id: u32,
}

/// `params` of an event notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventParams {
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event payload.
    pub data: Value,
    /// Which subscription matched.
    pub subscription: SubscriptionRef,
}

/// Unsolicited server→client event push.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventNotification {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Always `"event"`.
    pub method: String,
    /// Event details.
    pub params: EventParams,
}

impl EventNotification {
    /// Method name of event notifications.
    pub const METHOD: &'static str = "event";

    /// Build a notification.
    pub fn new(
        event_type: impl Into<String>,
        data: Map<String, Value>,
        subscription: SubscriptionRef,
    ) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            method: Self::METHOD.to_owned(),
            params: EventParams {
                event_type: event_type.into(),
                data: Value::Object(data),
                subscription,
            },
        }
    }
}
