//! Branded ID newtypes.
//!
//! Connection ids are UUID v7 strings. Session tokens are 32 lowercase hex
//! characters, the same shape the bus session service hands out.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Session id presented by clients that have not logged in.
pub const DEFAULT_SESSION_ID: &str = "00000000000000000000000000000000";

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $generate:expr) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh random id.
            #[must_use]
            pub fn new() -> Self {
                Self($generate)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

branded_id! {
    /// Unique identifier for one WebSocket connection.
    ConnectionId,
    Uuid::now_v7().to_string()
}

branded_id! {
    /// Bus session token (`ubus_rpc_session`).
    SessionToken,
    Uuid::now_v7().simple().to_string()
}

impl SessionToken {
    /// Whether this is the all-zero unauthenticated session.
    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_SESSION_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_is_uuid_v7() {
        let id = ConnectionId::new();
        let parsed = Uuid::parse_str(id.as_str()).expect("should be valid UUID");
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn session_token_is_32_hex() {
        let token = SessionToken::new();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!token.is_default());
    }

    #[test]
    fn default_session_recognized() {
        assert!(SessionToken::from(DEFAULT_SESSION_ID).is_default());
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
        assert_ne!(SessionToken::new(), SessionToken::new());
    }

    #[test]
    fn serde_transparent() {
        let id = ConnectionId::from("conn-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"conn-1\"");
    }
}
