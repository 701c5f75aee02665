//! Error types for bus operations and signature parsing.

use crate::status::BusStatus;

/// Failure of a bus collaborator operation.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// An object with this name is already registered.
    #[error("object already registered: {0}")]
    AlreadyRegistered(String),

    /// No object with this name is registered.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// The object exists but does not expose the method.
    #[error("method {method} not found on {object}")]
    MethodNotFound {
        /// Object name.
        object: String,
        /// Method name.
        method: String,
    },

    /// No event handler with this id is registered.
    #[error("event handler {0} not registered")]
    HandlerNotFound(u64),

    /// The handler dropped its deferred reply without completing it.
    #[error("request abandoned by handler")]
    Abandoned,

    /// The bus connection is gone.
    #[error("bus unavailable: {0}")]
    Unavailable(String),
}

impl BusError {
    /// Wire status code for this error.
    pub fn status(&self) -> BusStatus {
        match self {
            Self::AlreadyRegistered(_) => BusStatus::InvalidArgument,
            Self::ObjectNotFound(_) | Self::HandlerNotFound(_) => BusStatus::NotFound,
            Self::MethodNotFound { .. } => BusStatus::MethodNotFound,
            Self::Abandoned => BusStatus::UnknownError,
            Self::Unavailable(_) => BusStatus::ConnectionFailed,
        }
    }
}

/// Failure to interpret an advertised object signature.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// The signature root was not an object.
    #[error("signature for {object} is not an object")]
    NotAnObject {
        /// Object whose signature was malformed.
        object: String,
    },

    /// A method entry was not an object of arguments.
    #[error("method {method} of {object} has a malformed argument table")]
    MalformedMethod {
        /// Object name.
        object: String,
        /// Method name.
        method: String,
    },
}
