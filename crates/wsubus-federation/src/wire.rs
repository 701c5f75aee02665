//! Frames exchanged with a federation peer.
//!
//! Outbound: the four requests the session issues (`login`, `subscribe`,
//! `list`, `call`). Inbound: every frame is classified as a reply to one of
//! our numbered requests, an event notification, or noise.

use serde_json::{Map, Value, json};
use wsubus_core::DEFAULT_SESSION_ID;
use wsubus_rpc::{EventNotification, RpcRequest};

/// Object that answers `login` on the peer.
pub const SESSION_OBJECT: &str = "session";
/// Login method name.
pub const LOGIN_METHOD: &str = "login";
/// Key of the session token in a login reply.
pub const SESSION_TOKEN_KEY: &str = "ubus_rpc_session";

/// `call [default-sid, "session", "login", {username, password}]`
pub fn login_request(id: u64, username: &str, password: &str) -> RpcRequest {
    RpcRequest::new(
        id,
        "call",
        vec![
            json!(DEFAULT_SESSION_ID),
            json!(SESSION_OBJECT),
            json!(LOGIN_METHOD),
            json!({ "username": username, "password": password }),
        ],
    )
}

/// `subscribe [token, pattern]`
pub fn subscribe_request(id: u64, token: &str, pattern: &str) -> RpcRequest {
    RpcRequest::new(id, "subscribe", vec![json!(token), json!(pattern)])
}

/// `list [token, pattern]`
pub fn list_request(id: u64, token: &str, pattern: &str) -> RpcRequest {
    RpcRequest::new(id, "list", vec![json!(token), json!(pattern)])
}

/// `call [token, object, method, args]`
pub fn call_request(
    id: u64,
    token: &str,
    object: &str,
    method: &str,
    args: Map<String, Value>,
) -> RpcRequest {
    RpcRequest::new(
        id,
        "call",
        vec![json!(token), json!(object), json!(method), Value::Object(args)],
    )
}

/// A classified inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum PeerMessage {
    /// Reply to request `id`. `result` is `None` when the peer answered
    /// with a JSON-RPC `error` instead.
    Reply {
        /// Echoed request id.
        id: u64,
        /// The `result` member.
        result: Option<Value>,
    },
    /// Event notification.
    Event {
        /// Event type.
        event_type: String,
        /// Event payload.
        data: Value,
    },
    /// Anything else.
    Unrecognized,
}

/// Classify one inbound text frame.
pub fn classify(text: &str) -> Result<PeerMessage, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(mut obj) = value else {
        return Ok(PeerMessage::Unrecognized);
    };

    if obj.get("method").and_then(Value::as_str) == Some(EventNotification::METHOD) {
        let Some(Value::Object(mut params)) = obj.remove("params") else {
            return Ok(PeerMessage::Unrecognized);
        };
        let Some(Value::String(event_type)) = params.remove("type") else {
            return Ok(PeerMessage::Unrecognized);
        };
        let data = params.remove("data").unwrap_or(Value::Null);
        return Ok(PeerMessage::Event { event_type, data });
    }

    match obj.get("id").and_then(Value::as_u64) {
        Some(id) if obj.contains_key("result") || obj.contains_key("error") => {
            Ok(PeerMessage::Reply {
                id,
                result: obj.remove("result"),
            })
        }
        _ => Ok(PeerMessage::Unrecognized),
    }
}

/// Whether `result` is `[0, ...]`.
pub fn is_success(result: Option<&Value>) -> bool {
    result
        .and_then(Value::as_array)
        .and_then(|a| a.first())
        .and_then(Value::as_i64)
        == Some(0)
}

/// The payload object of a `[0, {...}]` result.
pub fn success_payload(result: Option<&Value>) -> Option<&Map<String, Value>> {
    if !is_success(result) {
        return None;
    }
    result?.get(1)?.as_object()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn login_uses_default_session() {
        let req = login_request(1, "admin", "admin");
        assert_eq!(req.method, "call");
        assert_eq!(
            req.params,
            vec![
                json!("00000000000000000000000000000000"),
                json!("session"),
                json!("login"),
                json!({"username": "admin", "password": "admin"}),
            ]
        );
    }

    #[test]
    fn call_addresses_object() {
        let req = call_request(9, "tok", "o1", "m1", Map::new());
        assert_eq!(req.id, json!(9));
        assert_eq!(req.params, vec![json!("tok"), json!("o1"), json!("m1"), json!({})]);
    }

    #[test]
    fn classify_reply() {
        let msg = classify(r#"{"jsonrpc":"2.0","id":3,"result":[0]}"#).unwrap();
        assert_eq!(
            msg,
            PeerMessage::Reply {
                id: 3,
                result: Some(json!([0]))
            }
        );
    }

    #[test]
    fn classify_error_reply() {
        let msg =
            classify(r#"{"jsonrpc":"2.0","id":4,"error":{"code":-32601,"message":"x"}}"#).unwrap();
        assert_eq!(msg, PeerMessage::Reply { id: 4, result: None });
    }

    #[test]
    fn classify_event() {
        let msg = classify(
            r#"{"jsonrpc":"2.0","method":"event","params":{"type":"ubus.object.add","data":{"path":"o2"},"subscription":{"pattern":"*","id":1}}}"#,
        )
        .unwrap();
        assert_matches!(msg, PeerMessage::Event { event_type, data } => {
            assert_eq!(event_type, "ubus.object.add");
            assert_eq!(data["path"], "o2");
        });
    }

    #[test]
    fn classify_noise() {
        assert_eq!(classify("[1]").unwrap(), PeerMessage::Unrecognized);
        assert_eq!(
            classify(r#"{"id":"abc","result":[0]}"#).unwrap(),
            PeerMessage::Unrecognized
        );
        assert!(classify("nope").is_err());
    }

    #[test]
    fn success_helpers() {
        let ok = json!([0, {"a": 1}]);
        assert!(is_success(Some(&ok)));
        assert_eq!(success_payload(Some(&ok)).unwrap()["a"], 1);
        assert!(!is_success(Some(&json!([4]))));
        assert!(!is_success(Some(&json!({"0": 0}))));
        assert!(!is_success(None));
        assert!(success_payload(Some(&json!([0]))).is_none());
    }
}
