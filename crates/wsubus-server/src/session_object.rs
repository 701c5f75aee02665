//! Built-in `session` object.
//!
//! `session.login(username, password)` hands out a fresh session token in
//! `ubus_rpc_session`. Federation peers log in through it before
//! subscribing.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};
use wsubus_core::{
    ArgKind, Bus, BusCall, BusError, BusStatus, CallReply, DeferredReply, ObjectHandler,
    ObjectSignature, SessionToken,
};

/// Registered object name.
pub const SESSION_OBJECT: &str = "session";
/// Login method name.
pub const LOGIN_METHOD: &str = "login";
/// Result key carrying the token.
pub const SESSION_TOKEN_KEY: &str = "ubus_rpc_session";

/// Checks credentials and issues tokens.
pub struct SessionObject {
    username: String,
    password: String,
}

impl SessionObject {
    /// Accept exactly `username` / `password`.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Method table of the object.
    pub fn signature() -> ObjectSignature {
        ObjectSignature::builder()
            .method(
                LOGIN_METHOD,
                [("username", ArgKind::String), ("password", ArgKind::String)],
            )
            .build()
    }

    /// Register on `bus` under [`SESSION_OBJECT`].
    pub fn register(self, bus: &dyn Bus) -> Result<u32, BusError> {
        bus.add_object(SESSION_OBJECT, Self::signature(), Arc::new(self))
    }

    fn login(&self, args: &Map<String, Value>) -> CallReply {
        let user = args.get("username").and_then(Value::as_str);
        let pass = args.get("password").and_then(Value::as_str);
        if user != Some(self.username.as_str()) || pass != Some(self.password.as_str()) {
            warn!(user = user.unwrap_or_default(), "login rejected");
            return CallReply::status(BusStatus::PermissionDenied);
        }
        let token = SessionToken::new();
        debug!(user = user.unwrap_or_default(), "login accepted");
        let mut data = Map::new();
        let _ = data.insert(SESSION_TOKEN_KEY.into(), Value::String(token.into_inner()));
        CallReply::ok(data)
    }
}

impl ObjectHandler for SessionObject {
    fn handle(&self, call: BusCall, reply: DeferredReply) {
        let outcome = match call.method.as_str() {
            LOGIN_METHOD => self.login(&call.args),
            _ => CallReply::status(BusStatus::MethodNotFound),
        };
        let _ = reply.complete(outcome);
    }
}
