//! Federation error type.

use wsubus_core::{BusError, BusStatus, SignatureError};

use crate::session::SessionState;

/// Errors raised by a federation link.
#[derive(Debug, thiserror::Error)]
pub enum FederationError {
    /// The peer answered with an unexpected shape. Fatal for the session.
    #[error("protocol violation while {state}: {detail}")]
    ProtocolViolation {
        /// Phase in which the violation happened.
        state: SessionState,
        /// What was wrong.
        detail: String,
    },

    /// Every call slot is taken.
    #[error("no free call slot (limit {limit})")]
    ResourceExhausted {
        /// Slot capacity.
        limit: usize,
    },

    /// An outbound frame is still waiting to be flushed.
    #[error("outbound frame pending, try again later")]
    Busy,

    /// The session is not ready to proxy calls.
    #[error("session not ready ({0})")]
    NotReady(SessionState),

    /// The link is gone.
    #[error("link to peer closed")]
    Disconnected,

    /// The peer URL could not be used.
    #[error("invalid peer url {url}: {reason}")]
    InvalidUrl {
        /// Configured URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// WebSocket transport failure.
    #[error("websocket error: {0}")]
    Transport(String),

    /// A request could not be encoded.
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    /// An advertised signature could not be read.
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// The local bus refused an operation.
    #[error(transparent)]
    Bus(#[from] BusError),
}

impl FederationError {
    /// Status used to fail a proxied bus call with this error.
    pub fn status(&self) -> BusStatus {
        match self {
            Self::ResourceExhausted { .. } | Self::NotReady(_) => BusStatus::NotSupported,
            Self::Transport(_) | Self::InvalidUrl { .. } => BusStatus::ConnectionFailed,
            Self::Bus(e) => e.status(),
            Self::Busy
            | Self::Disconnected
            | Self::ProtocolViolation { .. }
            | Self::Encode(_)
            | Self::Signature(_) => BusStatus::UnknownError,
        }
    }

    /// Whether the session must be torn down.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ProtocolViolation { .. } | Self::Disconnected | Self::Transport(_)
        )
    }
}
