//! Two bridges: A mirrors B's objects and proxies calls to them.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Map, Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use wsubus_core::{
    AllowAll, ArgKind, Bus, BusCall, BusStatus, CallReply, DeferredReply, LocalBus,
    ObjectSignature,
};
use wsubus_federation::{FederationClient, PeerConfig};
use wsubus_server::{ServerConfig, ServerContext, SessionObject, WsubusServer};

const TIMEOUT: Duration = Duration::from_secs(5);

fn echo_signature() -> ObjectSignature {
    ObjectSignature::builder()
        .method("echo", [("msg", ArgKind::String)])
        .build()
}

fn echo_handler() -> Arc<dyn wsubus_core::ObjectHandler> {
    Arc::new(|call: BusCall, reply: DeferredReply| {
        let _ = reply.complete(CallReply::ok(call.args));
    })
}

async fn serve(bus: &Arc<LocalBus>) -> (String, WsubusServer) {
    let ctx = ServerContext::new(
        Arc::clone(bus) as Arc<dyn Bus>,
        Arc::new(AllowAll),
        ServerConfig::default(),
    );
    let server = WsubusServer::new(ctx);
    let (addr, _handle) = server.listen().await.unwrap();
    (format!("ws://{addr}/ws"), server)
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    timeout(TIMEOUT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never became true");
}

struct Pair {
    bus_a: Arc<LocalBus>,
    bus_b: Arc<LocalBus>,
    server_b: WsubusServer,
    shutdown: CancellationToken,
    client: tokio::task::JoinHandle<()>,
}

async fn federate() -> Pair {
    let bus_b = Arc::new(LocalBus::new());
    let _ = bus_b.add_object("o1", echo_signature(), echo_handler()).unwrap();
    let _ = SessionObject::new("admin", "admin")
        .register(bus_b.as_ref())
        .unwrap();
    let (url_b, server_b) = serve(&bus_b).await;

    let bus_a = Arc::new(LocalBus::new());
    let shutdown = CancellationToken::new();
    let client = FederationClient::new(
        PeerConfig {
            reconnect_interval: Duration::from_millis(100),
            ..PeerConfig::new(url_b)
        },
        Arc::clone(&bus_a) as Arc<dyn Bus>,
    );
    let client = tokio::spawn(client.run(shutdown.clone()));

    let a = Arc::clone(&bus_a);
    wait_until(move || a.has_object("127.0.0.1/o1")).await;
    Pair {
        bus_a,
        bus_b,
        server_b,
        shutdown,
        client,
    }
}

fn args(msg: &str) -> Map<String, Value> {
    let mut args = Map::new();
    let _ = args.insert("msg".into(), json!(msg));
    args
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stub_call_reaches_peer() {
    let pair = federate().await;
    let reply = timeout(
        TIMEOUT,
        pair.bus_a.invoke(BusCall::new("127.0.0.1/o1", "echo", args("hello"))),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(reply.status, BusStatus::Ok);
    assert_eq!(reply.data.unwrap()["msg"], "hello");

    let sig = &pair.bus_a.lookup("127.0.0.1/o1")[0].signature;
    assert_eq!(sig.method("echo").unwrap().arg_kind("msg"), Some(ArgKind::String));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn peer_object_changes_are_mirrored() {
    let pair = federate().await;

    let _ = pair
        .bus_b
        .add_object("o2", echo_signature(), echo_handler())
        .unwrap();
    let a = Arc::clone(&pair.bus_a);
    wait_until(move || a.has_object("127.0.0.1/o2")).await;

    pair.bus_b.remove_object("o1").unwrap();
    let a = Arc::clone(&pair.bus_a);
    wait_until(move || !a.has_object("127.0.0.1/o1")).await;
    assert!(pair.bus_a.has_object("127.0.0.1/o2"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn clients_of_a_can_call_through_the_stub() {
    let pair = federate().await;
    let (url_a, _server_a) = serve(&pair.bus_a).await;

    let (mut ws, _) = connect_async(url_a.as_str()).await.unwrap();
    let req = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "call",
        "params": ["sid", "127.0.0.1/o1", "echo", {"msg": "via a"}],
    });
    ws.send(Message::Text(req.to_string().into())).await.unwrap();
    let resp: Value = loop {
        let msg = timeout(TIMEOUT, ws.next()).await.unwrap().unwrap().unwrap();
        if let Message::Text(text) = msg {
            break serde_json::from_str(&text).unwrap();
        }
    };
    assert_eq!(resp["result"], json!([0, {"msg": "via a"}]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn peer_shutdown_removes_stubs() {
    let pair = federate().await;
    pair.server_b.shutdown().shutdown();
    let a = Arc::clone(&pair.bus_a);
    wait_until(move || !a.has_object("127.0.0.1/o1")).await;

    pair.shutdown.cancel();
    timeout(TIMEOUT, pair.client).await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_shutdown_removes_stubs() {
    let pair = federate().await;
    pair.shutdown.cancel();
    timeout(TIMEOUT, pair.client).await.unwrap().unwrap();
    assert!(!pair.bus_a.has_object("127.0.0.1/o1"));
    assert!(!pair.bus_a.has_object("127.0.0.1/session"));
}
