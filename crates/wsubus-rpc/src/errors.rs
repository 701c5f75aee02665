//! JSON-RPC error codes and error type.

use serde_json::json;

use crate::types::RpcErrorBody;

// ── Error code constants ────────────────────────────────────────────

/// Frame is not valid JSON.
pub const PARSE_ERROR: i64 = -32700;
/// Envelope is not a valid JSON-RPC 2.0 request.
pub const INVALID_REQUEST: i64 = -32600;
/// Method is not one of the supported commands.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Parameters missing or of the wrong type.
pub const INVALID_PARAMS: i64 = -32602;
/// Unexpected internal error.
pub const INTERNAL_ERROR: i64 = -32603;
/// No free in-flight call slot.
pub const RESOURCE_EXHAUSTED: i64 = -32000;
/// An outbound frame is already pending.
pub const BUSY: i64 = -32001;

/// Why an envelope was rejected.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRequestReason {
    /// The frame decoded to something other than a JSON object.
    #[error("request must be a JSON object")]
    NotAnObject,
    /// No `jsonrpc` member.
    #[error("missing \"jsonrpc\" member")]
    MissingVersion,
    /// No string `method` member.
    #[error("missing or non-string \"method\" member")]
    MissingMethod,
    /// No array `params` member.
    #[error("missing or non-array \"params\" member")]
    MissingParams,
    /// `jsonrpc` is present but not `"2.0"`.
    #[error("unsupported jsonrpc version {found}")]
    VersionMismatch {
        /// The version that was sent, as JSON text.
        found: String,
    },
}

impl InvalidRequestReason {
    /// Stable machine-readable tag, sent as `error.data.reason`.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::NotAnObject => "not_an_object",
            Self::MissingVersion => "missing_version",
            Self::MissingMethod => "missing_method",
            Self::MissingParams => "missing_params",
            Self::VersionMismatch { .. } => "version_mismatch",
        }
    }
}

/// Errors answered with a JSON-RPC `error` object.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// Frame is not valid JSON.
    #[error("parse error: {message}")]
    Parse {
        /// Decoder message.
        message: String,
    },

    /// Envelope failed validation.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// Which check failed.
        reason: InvalidRequestReason,
    },

    /// Method is not supported.
    #[error("method not found: {method}")]
    MethodNotFound {
        /// Requested method name.
        method: String,
    },

    /// Required parameter missing or wrong type.
    #[error("invalid params: {message}")]
    InvalidParams {
        /// Description of what is wrong.
        message: String,
    },

    /// Internal error.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },

    /// Every in-flight call slot is taken.
    #[error("too many calls in flight (limit {limit})")]
    ResourceExhausted {
        /// Slot capacity.
        limit: usize,
    },

    /// An outbound frame is already pending.
    #[error("outbound channel busy, try again later")]
    Busy,
}

impl RpcError {
    /// Shorthand for [`RpcError::InvalidParams`].
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Numeric JSON-RPC error code.
    pub fn code(&self) -> i64 {
        match self {
            Self::Parse { .. } => PARSE_ERROR,
            Self::InvalidRequest { .. } => INVALID_REQUEST,
            Self::MethodNotFound { .. } => METHOD_NOT_FOUND,
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::Internal { .. } => INTERNAL_ERROR,
            Self::ResourceExhausted { .. } => RESOURCE_EXHAUSTED,
            Self::Busy => BUSY,
        }
    }

    /// Convert to the wire-format error body.
    pub fn to_error_body(&self) -> RpcErrorBody {
        RpcErrorBody {
            code: self.code(),
            message: self.to_string(),
            data: match self {
                Self::InvalidRequest { reason } => Some(json!({ "reason": reason.tag() })),
                _ => None,
            },
        }
    }
}
