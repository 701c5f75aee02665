//! Command execution.
//!
//! Every command except `call` is answered synchronously. A `call` takes a
//! slot on the connection, runs on its own task, and sends its response
//! when the bus replies, the call times out, or never if the connection
//! closes first.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument, trace};
use wsubus_core::{Bus, BusCall, BusStatus};
use wsubus_rpc::{Command, RpcError, RpcResponse};

use crate::context::ServerContext;
use crate::errors::SubscriptionError;
use crate::metrics::RPC_CALL_DURATION_SECONDS;
use crate::timeout::with_optional_timeout;
use crate::websocket::connection::ClientConnection;

/// Execute `command`. Returns the response to send now, or `None` when the
/// response will be sent later.
pub fn dispatch(
    id: Value,
    command: Command,
    conn: &Arc<ClientConnection>,
    ctx: &Arc<ServerContext>,
) -> Option<RpcResponse> {
    let subs = &ctx.subscriptions;
    let response = match command {
        Command::Call {
            sid: _,
            object,
            method,
            args,
        } => return start_call(id, BusCall::new(object, method, args), conn, ctx),
        Command::List { pattern } => list(id, ctx.bus.as_ref(), &pattern),
        Command::Dlist { pattern } => match &ctx.secondary_bus {
            Some(bus) => list(id, bus.as_ref(), &pattern),
            None => RpcResponse::status(id, BusStatus::NotSupported, None),
        },
        Command::Subscribe { sid, pattern } => {
            reply(id, subs.subscribe(conn, &sid, &pattern).map(|_| None))
        }
        Command::SubscribeList { sid } => reply(
            id,
            subs.list(conn, &sid).map(|refs| Some(json!(refs))),
        ),
        Command::Unsubscribe { sid, pattern } => reply(
            id,
            subs.unsubscribe_by_pattern(conn, &sid, &pattern).map(|()| None),
        ),
        Command::UnsubscribeById { sid, id: sub_id } => reply(
            id,
            subs.unsubscribe_by_id(conn, &sid, sub_id).map(|()| None),
        ),
    };
    Some(response)
}

fn reply(id: Value, outcome: Result<Option<Value>, SubscriptionError>) -> RpcResponse {
    match outcome {
        Ok(payload) => RpcResponse::status(id, BusStatus::Ok, payload),
        Err(e) => {
            debug!(error = %e, "subscription request failed");
            RpcResponse::status(id, e.status(), None)
        }
    }
}

/// `[0, {path: signature}]`, or `[4]` when nothing matches.
fn list(id: Value, bus: &dyn Bus, pattern: &str) -> RpcResponse {
    let objects = bus.lookup(pattern);
    if objects.is_empty() {
        return RpcResponse::status(id, BusStatus::NotFound, None);
    }
    let payload: Map<String, Value> = objects
        .into_iter()
        .map(|info| (info.path, info.signature.to_wire()))
        .collect();
    RpcResponse::ok(id, Value::Object(payload))
}

#[instrument(skip_all, fields(conn_id = %conn.id, object = %call.object, method = %call.method))]
fn start_call(
    id: Value,
    call: BusCall,
    conn: &Arc<ClientConnection>,
    ctx: &Arc<ServerContext>,
) -> Option<RpcResponse> {
    let (slot, cancel) = match conn.begin_call() {
        Ok(reserved) => reserved,
        Err(e) => {
            debug!(limit = e.capacity, "call rejected, no free slot");
            return Some(RpcResponse::error(
                id,
                &RpcError::ResourceExhausted { limit: e.capacity },
            ));
        }
    };

    let conn = Arc::clone(conn);
    let bus = Arc::clone(&ctx.bus);
    let timeout = ctx.config.call_timeout;
    drop(tokio::spawn(async move {
        let started = Instant::now();
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = with_optional_timeout(timeout, bus.invoke(call)) => Some(result),
        };
        conn.end_call(slot);
        let Some(result) = outcome else {
            trace!(conn_id = %conn.id, "call canceled by connection close");
            return;
        };
        histogram!(RPC_CALL_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        let response = match result {
            None => RpcResponse::status(id, BusStatus::Timeout, None),
            Some(Ok(reply)) => RpcResponse::status(id, reply.status, reply.data.map(Value::Object)),
            Some(Err(e)) => {
                debug!(conn_id = %conn.id, error = %e, "bus call failed");
                RpcResponse::status(id, e.status(), None)
            }
        };
        if !conn.send_response(&response) {
            debug!(conn_id = %conn.id, "failed to enqueue call response");
        }
    }));
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::sync::mpsc;
    use wsubus_core::{
        AllowAll, ArgKind, CallReply, ConnectionId, DeferredReply, LocalBus, ObjectSignature,
    };

    use crate::config::ServerConfig;

    struct Fixture {
        bus: Arc<LocalBus>,
        ctx: Arc<ServerContext>,
        conn: Arc<ClientConnection>,
        rx: mpsc::Receiver<Arc<String>>,
    }

    fn fixture_with(config: ServerConfig) -> Fixture {
        let bus = Arc::new(LocalBus::new());
        let echo = ObjectSignature::builder()
            .method("echo", [("msg", ArgKind::String)])
            .method("hang", Vec::<(String, ArgKind)>::new())
            .build();
        let _ = bus
            .add_object(
                "o1",
                echo,
                Arc::new(|call: BusCall, reply: DeferredReply| {
                    if call.method == "echo" {
                        let _ = reply.complete(CallReply::ok(call.args));
                    } else {
                        std::mem::forget(reply);
                    }
                }),
            )
            .unwrap();
        let ctx = Arc::new(ServerContext::new(
            Arc::clone(&bus) as Arc<dyn Bus>,
            Arc::new(AllowAll),
            config,
        ));
        let (tx, rx) = mpsc::channel(16);
        let conn = Arc::new(ClientConnection::new(
            ConnectionId::new(),
            tx,
            ctx.config.max_inflight_calls,
        ));
        Fixture { bus, ctx, conn, rx }
    }

    fn fixture() -> Fixture {
        fixture_with(ServerConfig::default())
    }

    fn run(f: &Fixture, command: Command) -> Value {
        let response = dispatch(json!(1), command, &f.conn, &f.ctx).unwrap();
        serde_json::to_value(response).unwrap()
    }

    async fn deferred(f: &mut Fixture) -> Value {
        let text = tokio::time::timeout(Duration::from_secs(1), f.rx.recv())
            .await
            .unwrap()
            .unwrap();
        serde_json::from_str(&text).unwrap()
    }

    fn call(method: &str, args: Value) -> Command {
        Command::Call {
            sid: "s".into(),
            object: "o1".into(),
            method: method.into(),
            args: args.as_object().cloned().unwrap_or_default(),
        }
    }

    // ── list / dlist ────────────────────────────────────────────────────

    #[test]
    fn list_reports_signatures() {
        let f = fixture();
        let v = run(&f, Command::List { pattern: "*".into() });
        assert_eq!(v["result"][0], 0);
        assert_eq!(v["result"][1]["o1"]["echo"], json!({"msg": "string"}));
        assert_eq!(v["result"][1]["o1"]["hang"], json!({}));
    }

    #[test]
    fn list_without_match_is_not_found() {
        let f = fixture();
        let v = run(&f, Command::List { pattern: "nope".into() });
        assert_eq!(v["result"], json!([4]));
    }

    #[test]
    fn dlist_without_secondary_bus_is_not_supported() {
        let f = fixture();
        let v = run(&f, Command::Dlist { pattern: "*".into() });
        assert_eq!(v["result"], json!([8]));
    }

    #[test]
    fn dlist_uses_secondary_bus() {
        let f = fixture();
        let secondary = Arc::new(LocalBus::new());
        let _ = secondary
            .add_object(
                "remote",
                ObjectSignature::default(),
                Arc::new(|_: BusCall, _: DeferredReply| {}),
            )
            .unwrap();
        let ctx = Arc::new(
            ServerContext::new(
                Arc::clone(&f.bus) as Arc<dyn Bus>,
                Arc::new(AllowAll),
                ServerConfig::default(),
            )
            .with_secondary_bus(secondary),
        );
        let response = dispatch(json!(1), Command::Dlist { pattern: "*".into() }, &f.conn, &ctx)
            .unwrap();
        let v = serde_json::to_value(response).unwrap();
        assert_eq!(v["result"], json!([0, {"remote": {}}]));
    }

    // ── subscriptions ───────────────────────────────────────────────────

    #[tokio::test]
    async fn subscribe_list_unsubscribe() {
        let f = fixture();
        let sub = |pattern: &str| Command::Subscribe {
            sid: "s".into(),
            pattern: pattern.into(),
        };
        assert_eq!(run(&f, sub("a.*"))["result"], json!([0]));
        assert_eq!(run(&f, sub("b"))["result"], json!([0]));

        let listed = run(&f, Command::SubscribeList { sid: "s".into() });
        assert_eq!(
            listed["result"],
            json!([0, [{"pattern": "a.*", "id": 1}, {"pattern": "b", "id": 2}]])
        );

        let by_id = Command::UnsubscribeById { sid: "s".into(), id: 1 };
        assert_eq!(run(&f, by_id.clone())["result"], json!([0]));
        assert_eq!(run(&f, by_id)["result"], json!([4]));

        let by_pattern = Command::Unsubscribe { sid: "s".into(), pattern: "b".into() };
        assert_eq!(run(&f, by_pattern)["result"], json!([0]));
        assert_eq!(f.ctx.subscriptions.count(), 0);
    }

    #[tokio::test]
    async fn sid_mismatch_is_not_supported() {
        let f = fixture();
        let _ = run(&f, Command::Subscribe { sid: "a".into(), pattern: "x".into() });
        let v = run(&f, Command::Subscribe { sid: "b".into(), pattern: "x".into() });
        assert_eq!(v["result"], json!([8]));
        let v = run(&f, Command::SubscribeList { sid: "b".into() });
        assert_eq!(v["result"], json!([8]));
    }

    // ── call ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn call_replies_later() {
        let mut f = fixture();
        assert!(dispatch(json!(7), call("echo", json!({"msg": "hi"})), &f.conn, &f.ctx).is_none());
        let v = deferred(&mut f).await;
        assert_eq!(v["id"], 7);
        assert_eq!(v["result"], json!([0, {"msg": "hi"}]));
        assert_eq!(f.conn.inflight_calls(), 0);
    }

    #[tokio::test]
    async fn call_missing_method_is_nonzero() {
        let mut f = fixture();
        assert!(dispatch(json!(1), call("nope", json!({})), &f.conn, &f.ctx).is_none());
        let v = deferred(&mut f).await;
        assert_eq!(v["result"], json!([3]));
    }

    #[tokio::test]
    async fn call_missing_object_is_not_found() {
        let mut f = fixture();
        let command = Command::Call {
            sid: "s".into(),
            object: "ghost".into(),
            method: "m".into(),
            args: Map::new(),
        };
        assert!(dispatch(json!(1), command, &f.conn, &f.ctx).is_none());
        assert_eq!(deferred(&mut f).await["result"], json!([4]));
    }

    #[tokio::test]
    async fn mistyped_argument_is_invalid_argument() {
        let mut f = fixture();
        assert!(dispatch(json!(1), call("echo", json!({"msg": 5})), &f.conn, &f.ctx).is_none());
        assert_eq!(deferred(&mut f).await["result"], json!([2]));
    }

    #[tokio::test(start_paused = true)]
    async fn call_timeout_is_status_seven() {
        let mut f = fixture_with(ServerConfig {
            call_timeout: Some(Duration::from_secs(2)),
            ..ServerConfig::default()
        });
        assert!(dispatch(json!(1), call("hang", json!({})), &f.conn, &f.ctx).is_none());
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(deferred(&mut f).await["result"], json!([7]));
        assert_eq!(f.conn.inflight_calls(), 0);
    }

    #[tokio::test]
    async fn exhausted_slots_reject_without_invoking() {
        let f = fixture_with(ServerConfig {
            call_timeout: None,
            max_inflight_calls: 2,
            ..ServerConfig::default()
        });
        let _ = dispatch(json!(1), call("hang", json!({})), &f.conn, &f.ctx);
        let _ = dispatch(json!(2), call("hang", json!({})), &f.conn, &f.ctx);
        let rejected = dispatch(json!(3), call("hang", json!({})), &f.conn, &f.ctx).unwrap();
        let v = serde_json::to_value(rejected).unwrap();
        assert_eq!(v["id"], 3);
        assert_eq!(v["error"]["code"], -32000);
        assert_eq!(f.conn.inflight_calls(), 2);
    }

    #[tokio::test]
    async fn close_cancels_pending_call() {
        let mut f = fixture_with(ServerConfig {
            call_timeout: None,
            ..ServerConfig::default()
        });
        let _ = dispatch(json!(1), call("hang", json!({})), &f.conn, &f.ctx);
        tokio::task::yield_now().await;
        let _ = f.conn.close();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(f.rx.try_recv().is_err());
        assert_eq!(f.conn.inflight_calls(), 0);
    }
}
