//! Typed commands.
//!
//! Each supported method has a fixed positional parameter layout. Parsing
//! is strict about required positions and ignores trailing extras. A parsed
//! command owns copies of all its strings.

use serde_json::{Map, Value};

use crate::envelope::RequestError;
use crate::errors::RpcError;
use crate::types::RpcRequest;

/// Method names accepted by [`Command::parse`].
pub const SUPPORTED_METHODS: [&str; 7] = [
    "call",
    "list",
    "subscribe",
    "subscribe-list",
    "unsubscribe",
    "unsubscribe-by-id",
    "dlist",
];

/// A validated command.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// `call [sid, object, method, args?]`
    Call {
        /// Session id presented by the caller.
        sid: String,
        /// Target object.
        object: String,
        /// Target method.
        method: String,
        /// Named arguments (empty when omitted).
        args: Map<String, Value>,
    },
    /// `list [sid, pattern]`
    List {
        /// Object name pattern.
        pattern: String,
    },
    /// `dlist [sid, pattern]`, answered from the secondary bus.
    Dlist {
        /// Object name pattern.
        pattern: String,
    },
    /// `subscribe [sid, pattern]`
    Subscribe {
        /// Session id presented by the caller.
        sid: String,
        /// Event type pattern.
        pattern: String,
    },
    /// `subscribe-list [sid]`
    SubscribeList {
        /// Session id presented by the caller.
        sid: String,
    },
    /// `unsubscribe [sid, pattern]`
    Unsubscribe {
        /// Session id presented by the caller.
        sid: String,
        /// Pattern to remove.
        pattern: String,
    },
    /// `unsubscribe-by-id [sid, id]`
    UnsubscribeById {
        /// Session id presented by the caller.
        sid: String,
        /// Subscription id to remove.
        id: u32,
    },
}

impl Command {
    /// Parse a method name and its positional parameters.
    pub fn parse(method: &str, params: &[Value]) -> Result<Self, RpcError> {
        match method {
            "call" => Ok(Self::Call {
                sid: string_at(params, 0, "sid")?,
                object: string_at(params, 1, "object")?,
                method: string_at(params, 2, "method")?,
                args: args_at(params, 3)?,
            }),
            "list" => Ok(Self::List {
                pattern: list_pattern(params)?,
            }),
            "dlist" => Ok(Self::Dlist {
                pattern: list_pattern(params)?,
            }),
            "subscribe" => Ok(Self::Subscribe {
                sid: string_at(params, 0, "sid")?,
                pattern: string_at(params, 1, "pattern")?,
            }),
            "subscribe-list" => Ok(Self::SubscribeList {
                sid: string_at(params, 0, "sid")?,
            }),
            "unsubscribe" => Ok(Self::Unsubscribe {
                sid: string_at(params, 0, "sid")?,
                pattern: string_at(params, 1, "pattern")?,
            }),
            "unsubscribe-by-id" => Ok(Self::UnsubscribeById {
                sid: string_at(params, 0, "sid")?,
                id: subscription_id_at(params, 1)?,
            }),
            other => Err(RpcError::MethodNotFound {
                method: other.to_owned(),
            }),
        }
    }

    /// Wire method name of this command.
    pub fn method_name(&self) -> &'static str {
        match self {
            Self::Call { .. } => "call",
            Self::List { .. } => "list",
            Self::Dlist { .. } => "dlist",
            Self::Subscribe { .. } => "subscribe",
            Self::SubscribeList { .. } => "subscribe-list",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::UnsubscribeById { .. } => "unsubscribe-by-id",
        }
    }
}

/// A command together with the request id it must answer.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedRequest {
    /// Opaque wire id.
    pub id: Value,
    /// The command.
    pub command: Command,
}

/// Turn a validated envelope into a command.
pub fn parse_command(request: RpcRequest) -> Result<ParsedRequest, RequestError> {
    match Command::parse(&request.method, &request.params) {
        Ok(command) => Ok(ParsedRequest {
            id: request.id,
            command,
        }),
        Err(error) => Err(RequestError::new(request.id, error)),
    }
}

// ── Parameter helpers ───────────────────────────────────────────────

fn string_at(params: &[Value], index: usize, name: &str) -> Result<String, RpcError> {
    match params.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(RpcError::invalid_params(format!(
            "parameter {index} ({name}) must be a string"
        ))),
        None => Err(RpcError::invalid_params(format!(
            "missing parameter {index} ({name})"
        ))),
    }
}

fn args_at(params: &[Value], index: usize) -> Result<Map<String, Value>, RpcError> {
    match params.get(index) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(RpcError::invalid_params(format!(
            "parameter {index} (args) must be an object"
        ))),
    }
}

fn list_pattern(params: &[Value]) -> Result<String, RpcError> {
    // Position 0 carries a session id that listing does not inspect.
    string_at(params, 1, "pattern")
}

fn subscription_id_at(params: &[Value], index: usize) -> Result<u32, RpcError> {
    params
        .get(index)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| {
            RpcError::invalid_params(format!(
                "parameter {index} (id) must be an unsigned 32-bit integer"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn parse(method: &str, params: Value) -> Result<Command, RpcError> {
        let Value::Array(params) = params else {
            panic!("params must be an array");
        };
        Command::parse(method, &params)
    }

    // ── Method selection ────────────────────────────────────────────

    #[test]
    fn unknown_method() {
        for method in ["", "Call", "session.login", "subscribe_list", "lists"] {
            assert_matches!(
                parse(method, json!(["s", "*"])),
                Err(RpcError::MethodNotFound { method: m }) if m == method
            );
        }
    }

    #[test]
    fn method_names_round_trip() {
        let samples = [
            json!(["s", "o", "m", {}]),
            json!(["s", "*"]),
            json!(["s", "*"]),
            json!(["s"]),
            json!(["s", "*"]),
            json!(["s", 1]),
            json!(["s", "*"]),
        ];
        for (method, params) in SUPPORTED_METHODS.iter().zip(samples) {
            let cmd = parse(method, params).unwrap();
            assert_eq!(cmd.method_name(), *method);
        }
    }

    // ── call ────────────────────────────────────────────────────────

    #[test]
    fn call_with_args() {
        let cmd = parse("call", json!(["sid", "network", "status", {"if": "lan"}])).unwrap();
        assert_matches!(cmd, Command::Call { sid, object, method, args } => {
            assert_eq!(sid, "sid");
            assert_eq!(object, "network");
            assert_eq!(method, "status");
            assert_eq!(args["if"], "lan");
        });
    }

    #[test]
    fn call_args_optional() {
        let cmd = parse("call", json!(["sid", "o", "m"])).unwrap();
        assert_matches!(cmd, Command::Call { args, .. } if args.is_empty());
    }

    #[test]
    fn call_args_must_be_object() {
        assert_matches!(
            parse("call", json!(["sid", "o", "m", [1]])),
            Err(RpcError::InvalidParams { .. })
        );
    }

    #[test]
    fn call_requires_strings() {
        assert_matches!(
            parse("call", json!(["sid", 1, "m", {}])),
            Err(RpcError::InvalidParams { message }) if message.contains("object")
        );
        assert_matches!(
            parse("call", json!(["sid", "o"])),
            Err(RpcError::InvalidParams { message }) if message.contains("missing")
        );
    }

    #[test]
    fn extra_params_ignored() {
        let cmd = parse("subscribe", json!(["sid", "ev.*", "extra", 5])).unwrap();
        assert_eq!(
            cmd,
            Command::Subscribe {
                sid: "sid".into(),
                pattern: "ev.*".into()
            }
        );
    }

    // ── list / dlist ────────────────────────────────────────────────

    #[test]
    fn list_ignores_session_position() {
        let cmd = parse("list", json!([null, "net*"])).unwrap();
        assert_eq!(
            cmd,
            Command::List {
                pattern: "net*".into()
            }
        );
    }

    #[test]
    fn list_requires_pattern() {
        assert_matches!(parse("list", json!(["sid"])), Err(RpcError::InvalidParams { .. }));
        assert_matches!(parse("dlist", json!([])), Err(RpcError::InvalidParams { .. }));
    }

    // ── subscriptions ───────────────────────────────────────────────

    #[test]
    fn subscribe_list_needs_sid() {
        assert_matches!(
            parse("subscribe-list", json!([])),
            Err(RpcError::InvalidParams { .. })
        );
    }

    #[test]
    fn unsubscribe_by_id_range() {
        assert_eq!(
            parse("unsubscribe-by-id", json!(["s", 42])).unwrap(),
            Command::UnsubscribeById {
                sid: "s".into(),
                id: 42
            }
        );
        for bad in [json!(-1), json!(1.5), json!("3"), json!(4_294_967_296_u64)] {
            assert_matches!(
                parse("unsubscribe-by-id", json!(["s", bad])),
                Err(RpcError::InvalidParams { .. })
            );
        }
    }

    // ── parse_command ───────────────────────────────────────────────

    #[test]
    fn parse_command_keeps_id_on_error() {
        let req = RpcRequest::new(json!("req-1"), "nope", vec![]);
        let err = parse_command(req).unwrap_err();
        assert_eq!(err.id, json!("req-1"));
        assert_matches!(err.error, RpcError::MethodNotFound { .. });
    }

    #[test]
    fn parse_command_carries_id() {
        let req = RpcRequest::new(json!(5), "subscribe-list", vec![json!("s")]);
        let parsed = parse_command(req).unwrap();
        assert_eq!(parsed.id, json!(5));
        assert_eq!(parsed.command, Command::SubscribeList { sid: "s".into() });
    }
}
