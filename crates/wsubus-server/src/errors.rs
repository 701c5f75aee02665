//! Server error types.

use wsubus_core::{BusError, BusStatus};

/// Failure of a subscription operation.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    /// The presented sid differs from the one bound to the connection.
    #[error("session id does not match the connection's session")]
    SessionMismatch,

    /// Nothing matched the request.
    #[error("no matching subscription")]
    NotFound,

    /// The bus refused the registration.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// Event delivery needs a tokio runtime and none is running.
    #[error("no tokio runtime available for event delivery")]
    NoRuntime,
}

impl SubscriptionError {
    /// Status code reported in `result[0]`.
    pub fn status(&self) -> BusStatus {
        match self {
            Self::SessionMismatch => BusStatus::NotSupported,
            Self::NotFound => BusStatus::NotFound,
            Self::Bus(e) => e.status(),
            Self::NoRuntime => BusStatus::UnknownError,
        }
    }
}
