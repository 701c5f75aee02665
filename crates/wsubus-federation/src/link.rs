//! Shared handle to a federation session.
//!
//! [`FederationLink`] is what stub handlers and the socket driver hold. It
//! guards the session with a `parking_lot::Mutex` and wakes the driver
//! through a [`Notify`] whenever a frame becomes ready to send.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};
use wsubus_core::{Bus, BusCall, DeferredReply};

use crate::errors::FederationError;
use crate::session::{Credentials, FederationSession, SessionState};

/// A federation session shared between its driver and its stubs.
pub struct FederationLink {
    session: Mutex<FederationSession>,
    outbound_ready: Notify,
}

impl FederationLink {
    /// Create a link for `peer`. Stubs are registered on `bus`.
    pub fn new(
        peer: impl Into<String>,
        credentials: Credentials,
        bus: Arc<dyn Bus>,
        max_inflight: usize,
    ) -> Arc<Self> {
        let peer = peer.into();
        Arc::new_cyclic(|weak| Self {
            session: Mutex::new(FederationSession::new(
                peer,
                credentials,
                bus,
                max_inflight,
                weak.clone(),
            )),
            outbound_ready: Notify::new(),
        })
    }

    /// Begin the login handshake.
    pub fn establish(&self) -> Result<(), FederationError> {
        self.session.lock().establish()?;
        self.outbound_ready.notify_one();
        Ok(())
    }

    /// Feed one inbound frame. An error means the session must end.
    pub fn handle_frame(&self, text: &str) -> Result<(), FederationError> {
        let result = self.session.lock().on_frame(text);
        self.outbound_ready.notify_one();
        result
    }

    /// Take the next frame to write, if any.
    pub fn take_outbound(&self) -> Option<String> {
        self.session.lock().take_outbound()
    }

    /// Resolves once a frame may be waiting in the outbound slot.
    pub async fn outbound_ready(&self) {
        self.outbound_ready.notified().await;
    }

    /// Forward a stub call. Rejections complete `reply` immediately.
    pub fn proxy_call(&self, remote_object: &str, call: BusCall, reply: DeferredReply) {
        let outcome =
            self.session
                .lock()
                .begin_call(remote_object, &call.method, call.args, reply);
        match outcome {
            Ok(call_id) => {
                debug!(call_id, object = remote_object, method = %call.method, "call forwarded");
                self.outbound_ready.notify_one();
            }
            Err((e, reply)) => {
                warn!(object = remote_object, method = %call.method, error = %e, "proxied call rejected");
                let _ = reply.fail(e.status());
            }
        }
    }

    /// Terminate the session. Idempotent.
    pub fn terminate(&self) {
        self.session.lock().terminate();
    }

    /// Current phase.
    pub fn state(&self) -> SessionState {
        self.session.lock().state()
    }

    /// Local names of mirrored objects.
    pub fn stub_names(&self) -> Vec<String> {
        self.session.lock().stubs().local_names()
    }

    /// Proxied calls awaiting a reply.
    pub fn inflight_calls(&self) -> usize {
        self.session.lock().inflight_calls()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value, json};
    use wsubus_core::{BusStatus, LocalBus};

    fn reply(id: &Value, result: Value) -> String {
        json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string()
    }

    fn frame(link: &FederationLink) -> Value {
        serde_json::from_str(&link.take_outbound().unwrap()).unwrap()
    }

    fn ready_link(bus: &Arc<LocalBus>) -> Arc<FederationLink> {
        let link = FederationLink::new(
            "peer-a",
            Credentials::default(),
            Arc::clone(bus) as Arc<dyn Bus>,
            20,
        );
        link.establish().unwrap();
        let login = frame(&link);
        link.handle_frame(&reply(&login["id"], json!([0, {"ubus_rpc_session": "tok"}])))
            .unwrap();
        let sub = frame(&link);
        link.handle_frame(&reply(&sub["id"], json!([0]))).unwrap();
        let list = frame(&link);
        link.handle_frame(&reply(&list["id"], json!([0, {"o1": {"m1": {"a": "s"}}}])))
            .unwrap();
        link
    }

    #[tokio::test]
    async fn bus_call_on_stub_reaches_peer() {
        let bus = Arc::new(LocalBus::new());
        let link = ready_link(&bus);
        assert_eq!(link.stub_names(), vec!["peer-a/o1".to_owned()]);

        let caller = {
            let bus = Arc::clone(&bus);
            tokio::spawn(async move {
                let mut args = Map::new();
                let _ = args.insert("a".into(), json!("hi"));
                bus.invoke(BusCall::new("peer-a/o1", "m1", args)).await
            })
        };

        link.outbound_ready().await;
        let call = loop {
            if let Some(text) = link.take_outbound() {
                break serde_json::from_str::<Value>(&text).unwrap();
            }
            tokio::task::yield_now().await;
        };
        assert_eq!(call["params"], json!(["tok", "o1", "m1", {"a": "hi"}]));
        link.handle_frame(&reply(&call["id"], json!([0, {"echo": "hi"}])))
            .unwrap();

        let got = caller.await.unwrap().unwrap();
        assert_eq!(got.status, BusStatus::Ok);
        assert_eq!(got.data.unwrap()["echo"], "hi");
    }

    #[tokio::test]
    async fn busy_surfaces_as_unknown_error() {
        let bus = Arc::new(LocalBus::new());
        let link = ready_link(&bus);
        let (first, _rx) = DeferredReply::channel();
        link.proxy_call("o1", BusCall::new("peer-a/o1", "m1", Map::new()), first);

        let second = bus
            .invoke(BusCall::new("peer-a/o1", "m1", Map::new()))
            .await
            .unwrap();
        assert_eq!(second.status, BusStatus::UnknownError);
        assert_eq!(link.inflight_calls(), 1);
    }

    #[tokio::test]
    async fn terminate_unregisters_stubs() {
        let bus = Arc::new(LocalBus::new());
        let link = ready_link(&bus);
        link.terminate();
        link.terminate();
        assert_eq!(link.state(), SessionState::Closed);
        assert!(!bus.has_object("peer-a/o1"));
        let err = bus
            .invoke(BusCall::new("peer-a/o1", "m1", Map::new()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), BusStatus::NotFound);
    }
}
