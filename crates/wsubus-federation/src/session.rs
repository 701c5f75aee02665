//! Federation session state machine.
//!
//! One [`FederationSession`] exists per established link. It logs in with
//! the default session id, subscribes to every event, enumerates the peer's
//! objects and mirrors them as stubs, then proxies calls until the link
//! ends.
//!
//! The session never touches the socket. Each request it wants to send is
//! placed in a single outbound slot which the driver drains with
//! [`FederationSession::take_outbound`]. While the slot is occupied, protocol
//! steps are deferred and proxied calls are rejected with `Busy`.

use std::fmt;
use std::sync::{Arc, Weak};

use metrics::counter;
use serde_json::{Map, Value};
use tracing::{debug, info, trace, warn};
use wsubus_core::{
    Bus, BusStatus, CallReply, CallSlots, DeferredReply, OBJECT_ADD_EVENT, OBJECT_REMOVE_EVENT,
};
use wsubus_rpc::RpcRequest;

use crate::errors::FederationError;
use crate::link::FederationLink;
use crate::stubs::StubRegistry;
use crate::wire::{self, PeerMessage};

/// Pattern used for the peer subscription and enumeration.
const ALL: &str = "*";

/// Phase of a federation session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Link established, nothing sent yet.
    Connecting,
    /// Waiting for the login reply.
    LoginSent,
    /// Waiting for the subscribe reply.
    ListenSent,
    /// Waiting for an enumeration reply.
    ListSent,
    /// Discovery done; calls may be proxied.
    Ready,
    /// Terminated.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connecting => "CONNECTING",
            Self::LoginSent => "LOGIN_SENT",
            Self::ListenSent => "LISTEN_SENT",
            Self::ListSent => "LIST_SENT",
            Self::Ready => "READY",
            Self::Closed => "CLOSED",
        })
    }
}

/// Login credentials presented to the peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Build credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new("admin", "admin")
    }
}

/// State of one federation link.
pub struct FederationSession {
    peer: String,
    credentials: Credentials,
    state: SessionState,
    next_call_id: u64,
    token: Option<String>,
    /// Id of the login/subscribe/list request awaiting its reply.
    awaiting: Option<u64>,
    discovered: bool,
    relist_pending: bool,
    outbound: Option<String>,
    calls: CallSlots<u64, DeferredReply>,
    stubs: StubRegistry,
}

impl FederationSession {
    pub(crate) fn new(
        peer: String,
        credentials: Credentials,
        bus: Arc<dyn Bus>,
        max_inflight: usize,
        link: Weak<FederationLink>,
    ) -> Self {
        Self {
            stubs: StubRegistry::new(peer.clone(), bus, link),
            peer,
            credentials,
            state: SessionState::Connecting,
            next_call_id: 0,
            token: None,
            awaiting: None,
            discovered: false,
            relist_pending: false,
            outbound: None,
            calls: CallSlots::new(max_inflight),
        }
    }

    /// Current phase.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Peer host name used to qualify stub names.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Session token obtained at login.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Mirrored objects.
    pub fn stubs(&self) -> &StubRegistry {
        &self.stubs
    }

    /// Proxied calls awaiting a reply.
    pub fn inflight_calls(&self) -> usize {
        self.calls.in_use()
    }

    /// Whether a frame is waiting to be flushed.
    pub fn has_outbound(&self) -> bool {
        self.outbound.is_some()
    }

    /// Start the handshake. Only acts in [`SessionState::Connecting`].
    pub fn establish(&mut self) -> Result<(), FederationError> {
        if self.state != SessionState::Connecting {
            return Ok(());
        }
        let credentials = self.credentials.clone();
        self.send_protocol(|id| {
            wire::login_request(id, &credentials.username, &credentials.password)
        })?;
        self.enter(SessionState::LoginSent);
        Ok(())
    }

    /// Hand the pending frame to the driver.
    ///
    /// Freeing the slot lets a coalesced re-enumeration go out.
    pub fn take_outbound(&mut self) -> Option<String> {
        let frame = self.outbound.take()?;
        if self.relist_pending && self.state == SessionState::Ready {
            self.relist_pending = false;
            if let Err(e) = self.start_relist() {
                warn!(peer = %self.peer, error = %e, "failed to schedule re-enumeration");
            }
        }
        Some(frame)
    }

    /// Process one inbound text frame.
    ///
    /// Only errors that must end the session are returned; malformed or
    /// unmatched frames are logged and dropped.
    pub fn on_frame(&mut self, text: &str) -> Result<(), FederationError> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        let message = match wire::classify(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "dropping unparseable frame");
                return Ok(());
            }
        };

        match message {
            PeerMessage::Reply { id, result } if self.awaiting == Some(id) => {
                self.awaiting = None;
                self.on_protocol_reply(result)
            }
            PeerMessage::Reply { id, result } => {
                match self.calls.take(&id) {
                    Some(reply) => {
                        let _ = reply.complete(call_reply(result.as_ref()));
                    }
                    None => warn!(peer = %self.peer, call_id = id, "reply for unknown id dropped"),
                }
                Ok(())
            }
            PeerMessage::Event { event_type, data } => {
                self.on_peer_event(&event_type, &data);
                Ok(())
            }
            PeerMessage::Unrecognized => {
                debug!(peer = %self.peer, "dropping unrecognized frame");
                Ok(())
            }
        }
    }

    /// Forward a call on a stub to the peer.
    ///
    /// Both rejections happen before anything is allocated; on error the
    /// reply handle is given back untouched.
    pub fn begin_call(
        &mut self,
        remote_object: &str,
        method: &str,
        args: Map<String, Value>,
        reply: DeferredReply,
    ) -> Result<u64, (FederationError, DeferredReply)> {
        let token = match (self.state, self.token.as_deref()) {
            (SessionState::Ready | SessionState::ListSent, Some(token)) => token.to_owned(),
            (SessionState::Closed, _) => return Err((FederationError::Disconnected, reply)),
            (state, _) => return Err((FederationError::NotReady(state), reply)),
        };
        if self.calls.is_full() {
            let limit = self.calls.capacity();
            return Err((FederationError::ResourceExhausted { limit }, reply));
        }
        if self.outbound.is_some() {
            return Err((FederationError::Busy, reply));
        }

        let id = self.next_call_id + 1;
        let frame = match serde_json::to_string(&wire::call_request(
            id,
            &token,
            remote_object,
            method,
            args,
        )) {
            Ok(frame) => frame,
            Err(e) => return Err((e.into(), reply)),
        };
        let slot = match self.calls.acquire() {
            Ok(slot) => slot,
            Err(e) => {
                let limit = e.capacity;
                return Err((FederationError::ResourceExhausted { limit }, reply));
            }
        };
        self.next_call_id = id;
        let _ = self.calls.bind(slot, id, reply);
        self.outbound = Some(frame);

        counter!("federation_calls_total", "peer" => self.peer.clone()).increment(1);
        trace!(peer = %self.peer, call_id = id, object = remote_object, method, "call proxied");
        Ok(id)
    }

    /// Tear the session down: fail every pending call, remove every stub.
    /// Idempotent.
    pub fn terminate(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        let failed = self.calls.drain();
        let pending = failed.len();
        for reply in failed {
            let _ = reply.fail(FederationError::Disconnected.status());
        }
        let removed = self.stubs.destroy_all();
        self.outbound = None;
        self.awaiting = None;
        self.relist_pending = false;
        self.enter(SessionState::Closed);
        info!(peer = %self.peer, pending, removed, "federation session closed");
    }

    // ── Protocol steps ──────────────────────────────────────────────────

    fn on_protocol_reply(&mut self, result: Option<Value>) -> Result<(), FederationError> {
        match self.state {
            SessionState::LoginSent => {
                let token = wire::success_payload(result.as_ref())
                    .and_then(|p| p.get(wire::SESSION_TOKEN_KEY))
                    .and_then(Value::as_str)
                    .ok_or_else(|| self.violation("login reply carries no session token"))?
                    .to_owned();
                self.send_protocol(|id| wire::subscribe_request(id, &token, ALL))?;
                self.token = Some(token);
                self.enter(SessionState::ListenSent);
                Ok(())
            }
            SessionState::ListenSent => {
                if !wire::is_success(result.as_ref()) {
                    return Err(self.violation("subscribe rejected"));
                }
                let token = self.token.clone().unwrap_or_default();
                self.send_protocol(|id| wire::list_request(id, &token, ALL))?;
                self.enter(SessionState::ListSent);
                Ok(())
            }
            SessionState::ListSent => self.on_list_reply(result.as_ref()),
            SessionState::Connecting | SessionState::Ready | SessionState::Closed => Ok(()),
        }
    }

    fn on_list_reply(&mut self, result: Option<&Value>) -> Result<(), FederationError> {
        let objects = if wire::is_success(result) {
            wire::success_payload(result).cloned().unwrap_or_default()
        } else if self.discovered {
            warn!(peer = %self.peer, result = ?result, "re-enumeration failed");
            self.enter(SessionState::Ready);
            return Ok(());
        } else {
            return Err(self.violation("enumeration rejected"));
        };

        if self.discovered {
            let pruned = self.stubs.retain(|object| objects.contains_key(object));
            if pruned > 0 {
                debug!(peer = %self.peer, pruned, "stubs for vanished objects removed");
            }
        }
        for (object, signature) in &objects {
            if let Err(e) = self.stubs.create(object, signature) {
                warn!(peer = %self.peer, object = %object, error = %e, "failed to create stub");
            }
        }
        if !self.discovered {
            info!(peer = %self.peer, objects = self.stubs.len(), "federation ready");
        }
        self.discovered = true;
        self.enter(SessionState::Ready);

        if self.relist_pending && self.outbound.is_none() {
            self.relist_pending = false;
            self.start_relist()?;
        }
        Ok(())
    }

    fn on_peer_event(&mut self, event_type: &str, data: &Value) {
        match event_type {
            OBJECT_ADD_EVENT => match self.state {
                SessionState::Ready if self.outbound.is_none() => {
                    if let Err(e) = self.start_relist() {
                        warn!(peer = %self.peer, error = %e, "failed to start re-enumeration");
                    }
                }
                SessionState::Ready | SessionState::ListSent => self.relist_pending = true,
                _ => {}
            },
            OBJECT_REMOVE_EVENT => {
                if let Some(path) = data.get("path").and_then(Value::as_str) {
                    let _ = self.stubs.destroy(path);
                }
            }
            other => trace!(peer = %self.peer, event = other, "ignoring peer event"),
        }
    }

    fn start_relist(&mut self) -> Result<(), FederationError> {
        let token = self.token.clone().unwrap_or_default();
        self.send_protocol(|id| wire::list_request(id, &token, ALL))?;
        self.enter(SessionState::ListSent);
        Ok(())
    }

    /// Queue a protocol request and remember its id.
    fn send_protocol(
        &mut self,
        build: impl FnOnce(u64) -> RpcRequest,
    ) -> Result<(), FederationError> {
        if self.outbound.is_some() {
            return Err(FederationError::Busy);
        }
        let id = self.next_call_id + 1;
        let frame = serde_json::to_string(&build(id))?;
        self.next_call_id = id;
        self.awaiting = Some(id);
        self.outbound = Some(frame);
        Ok(())
    }

    fn enter(&mut self, state: SessionState) {
        if self.state != state {
            debug!(peer = %self.peer, from = %self.state, to = %state, "session state");
            self.state = state;
        }
    }

    fn violation(&self, detail: &str) -> FederationError {
        FederationError::ProtocolViolation {
            state: self.state,
            detail: detail.to_owned(),
        }
    }
}

/// Translate a peer's call result. Only `[0, ...]` counts as success.
fn call_reply(result: Option<&Value>) -> CallReply {
    if !wire::is_success(result) {
        return CallReply::status(BusStatus::UnknownError);
    }
    match wire::success_payload(result) {
        Some(data) => CallReply::ok(data.clone()),
        None => CallReply::empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wsubus_core::LocalBus;

    fn session_with(bus: &Arc<LocalBus>, max_inflight: usize) -> FederationSession {
        let bus: Arc<dyn Bus> = Arc::clone(bus) as Arc<dyn Bus>;
        FederationSession::new(
            "peer-a".into(),
            Credentials::default(),
            bus,
            max_inflight,
            Weak::new(),
        )
    }

    fn sent(session: &mut FederationSession) -> Value {
        let frame = session.take_outbound().expect("frame queued");
        serde_json::from_str(&frame).unwrap()
    }

    fn reply(id: &Value, result: Value) -> String {
        json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string()
    }

    fn event(event_type: &str, data: Value) -> String {
        json!({
            "jsonrpc": "2.0",
            "method": "event",
            "params": {"type": event_type, "data": data, "subscription": {"pattern": "*", "id": 1}},
        })
        .to_string()
    }

    /// Drive a session to READY with the given peer objects.
    fn ready(bus: &Arc<LocalBus>, objects: Value) -> FederationSession {
        let mut s = session_with(bus, 20);
        s.establish().unwrap();
        let login = sent(&mut s);
        s.on_frame(&reply(&login["id"], json!([0, {"ubus_rpc_session": "deadbeef"}])))
            .unwrap();
        let sub = sent(&mut s);
        s.on_frame(&reply(&sub["id"], json!([0]))).unwrap();
        let list = sent(&mut s);
        s.on_frame(&reply(&list["id"], json!([0, objects]))).unwrap();
        assert_eq!(s.state(), SessionState::Ready);
        s
    }

    // ── Handshake ───────────────────────────────────────────────────────

    #[test]
    fn establish_sends_login() {
        let bus = Arc::new(LocalBus::new());
        let mut s = session_with(&bus, 20);
        s.establish().unwrap();
        assert_eq!(s.state(), SessionState::LoginSent);
        let login = sent(&mut s);
        assert_eq!(login["method"], "call");
        assert_eq!(login["params"][0], "00000000000000000000000000000000");
        assert_eq!(login["params"][1], "session");
        assert_eq!(login["params"][2], "login");
        assert_eq!(login["params"][3]["username"], "admin");
        assert!(s.take_outbound().is_none());
    }

    #[test]
    fn establish_twice_is_noop() {
        let bus = Arc::new(LocalBus::new());
        let mut s = session_with(&bus, 20);
        s.establish().unwrap();
        let _ = s.take_outbound();
        s.establish().unwrap();
        assert!(!s.has_outbound());
    }

    #[test]
    fn login_reply_sends_exactly_one_subscribe() {
        let bus = Arc::new(LocalBus::new());
        let mut s = session_with(&bus, 20);
        s.establish().unwrap();
        let login = sent(&mut s);
        s.on_frame(&reply(&login["id"], json!([0, {"ubus_rpc_session": "deadbeef"}])))
            .unwrap();
        assert_eq!(s.state(), SessionState::ListenSent);
        assert_eq!(s.token(), Some("deadbeef"));
        let sub = sent(&mut s);
        assert_eq!(sub["method"], "subscribe");
        assert_eq!(sub["params"], json!(["deadbeef", "*"]));
        assert!(s.take_outbound().is_none());
    }

    #[test]
    fn bad_login_is_protocol_violation() {
        let bus = Arc::new(LocalBus::new());
        let mut s = session_with(&bus, 20);
        s.establish().unwrap();
        let login = sent(&mut s);
        let err = s.on_frame(&reply(&login["id"], json!([6]))).unwrap_err();
        assert_matches!(
            err,
            FederationError::ProtocolViolation { state: SessionState::LoginSent, .. }
        );
    }

    #[test]
    fn login_without_token_is_protocol_violation() {
        let bus = Arc::new(LocalBus::new());
        let mut s = session_with(&bus, 20);
        s.establish().unwrap();
        let login = sent(&mut s);
        let err = s.on_frame(&reply(&login["id"], json!([0, {}]))).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn rejected_subscribe_is_protocol_violation() {
        let bus = Arc::new(LocalBus::new());
        let mut s = session_with(&bus, 20);
        s.establish().unwrap();
        let login = sent(&mut s);
        s.on_frame(&reply(&login["id"], json!([0, {"ubus_rpc_session": "t"}])))
            .unwrap();
        let sub = sent(&mut s);
        assert_matches!(
            s.on_frame(&reply(&sub["id"], json!([8]))),
            Err(FederationError::ProtocolViolation { state: SessionState::ListenSent, .. })
        );
    }

    #[test]
    fn list_creates_stubs() {
        let bus = Arc::new(LocalBus::new());
        let s = ready(&bus, json!({"o1": {"m1": {"a1": "s"}}}));
        assert_eq!(s.stubs().local_names(), vec!["peer-a/o1".to_owned()]);
        let info = bus.lookup("peer-a/o1");
        assert_eq!(info.len(), 1);
        let m1 = info[0].signature.method("m1").unwrap();
        assert_eq!(m1.arg_kind("a1"), Some(wsubus_core::ArgKind::String));
    }

    #[test]
    fn rejected_initial_list_is_protocol_violation() {
        let bus = Arc::new(LocalBus::new());
        let mut s = session_with(&bus, 20);
        s.establish().unwrap();
        let login = sent(&mut s);
        s.on_frame(&reply(&login["id"], json!([0, {"ubus_rpc_session": "t"}])))
            .unwrap();
        let sub = sent(&mut s);
        s.on_frame(&reply(&sub["id"], json!([0]))).unwrap();
        let list = sent(&mut s);
        assert_matches!(
            s.on_frame(&reply(&list["id"], json!([9]))),
            Err(FederationError::ProtocolViolation { state: SessionState::ListSent, .. })
        );
    }

    #[test]
    fn garbage_frames_are_dropped() {
        let bus = Arc::new(LocalBus::new());
        let mut s = ready(&bus, json!({}));
        s.on_frame("not json").unwrap();
        s.on_frame("[1,2]").unwrap();
        s.on_frame(&reply(&json!(999), json!([0]))).unwrap();
        assert_eq!(s.state(), SessionState::Ready);
    }

    // ── Peer events ─────────────────────────────────────────────────────

    #[test]
    fn object_add_triggers_relist() {
        let bus = Arc::new(LocalBus::new());
        let mut s = ready(&bus, json!({"o1": {}}));
        s.on_frame(&event("ubus.object.add", json!({"id": 2, "path": "o2"})))
            .unwrap();
        assert_eq!(s.state(), SessionState::ListSent);
        let list = sent(&mut s);
        assert_eq!(list["method"], "list");

        s.on_frame(&reply(&list["id"], json!([0, {"o1": {}, "o2": {"m": {}}}])))
            .unwrap();
        assert_eq!(s.state(), SessionState::Ready);
        assert!(bus.has_object("peer-a/o2"));
        assert_eq!(s.stubs().len(), 2);
    }

    #[test]
    fn overlapping_adds_coalesce() {
        let bus = Arc::new(LocalBus::new());
        let mut s = ready(&bus, json!({}));
        s.on_frame(&event("ubus.object.add", json!({"path": "o1"})))
            .unwrap();
        let first = sent(&mut s);
        for path in ["o2", "o3", "o4"] {
            s.on_frame(&event("ubus.object.add", json!({"path": path})))
                .unwrap();
        }
        assert!(!s.has_outbound());

        s.on_frame(&reply(&first["id"], json!([0, {"o1": {}}]))).unwrap();
        let second = sent(&mut s);
        assert_eq!(second["method"], "list");
        s.on_frame(&reply(&second["id"], json!([0, {"o1": {}, "o2": {}, "o3": {}, "o4": {}}])))
            .unwrap();
        assert!(s.take_outbound().is_none());
        assert_eq!(s.stubs().len(), 4);
    }

    #[test]
    fn failed_relist_returns_to_ready() {
        let bus = Arc::new(LocalBus::new());
        let mut s = ready(&bus, json!({"o1": {}}));
        s.on_frame(&event("ubus.object.add", json!({"path": "o2"})))
            .unwrap();
        let list = sent(&mut s);
        s.on_frame(&reply(&list["id"], json!([9]))).unwrap();
        assert_eq!(s.state(), SessionState::Ready);
        assert_eq!(s.stubs().len(), 1);
    }

    #[test]
    fn relist_drops_vanished_objects() {
        let bus = Arc::new(LocalBus::new());
        let mut s = ready(&bus, json!({"o1": {}, "o2": {}}));
        s.on_frame(&event("ubus.object.add", json!({"path": "o3"})))
            .unwrap();
        let list = sent(&mut s);
        s.on_frame(&reply(&list["id"], json!([0, {"o2": {}, "o3": {}}])))
            .unwrap();
        assert_eq!(s.state(), SessionState::Ready);
        assert!(!bus.has_object("peer-a/o1"));
        assert!(bus.has_object("peer-a/o2"));
        assert!(bus.has_object("peer-a/o3"));
        assert_eq!(s.stubs().len(), 2);
    }

    #[test]
    fn object_remove_destroys_stub() {
        let bus = Arc::new(LocalBus::new());
        let mut s = ready(&bus, json!({"o1": {}, "o2": {}}));
        s.on_frame(&event("ubus.object.remove", json!({"id": 1, "path": "o1"})))
            .unwrap();
        assert!(!bus.has_object("peer-a/o1"));
        assert!(bus.has_object("peer-a/o2"));
        s.on_frame(&event("ubus.object.remove", json!({"path": "o1"})))
            .unwrap();
        assert_eq!(s.stubs().len(), 1);
    }

    // ── Proxied calls ───────────────────────────────────────────────────

    #[tokio::test]
    async fn call_round_trip() {
        let bus = Arc::new(LocalBus::new());
        let mut s = ready(&bus, json!({"o1": {"m1": {}}}));
        let (handle, rx) = DeferredReply::channel();
        let id = s
            .begin_call("o1", "m1", Map::new(), handle)
            .map_err(|(e, _)| e)
            .unwrap();
        let frame = sent(&mut s);
        assert_eq!(frame["id"], json!(id));
        assert_eq!(frame["params"], json!(["deadbeef", "o1", "m1", {}]));
        assert_eq!(s.inflight_calls(), 1);

        s.on_frame(&reply(&json!(id), json!([0, {"x": 1}]))).unwrap();
        let got = rx.await.unwrap();
        assert_eq!(got.status, BusStatus::Ok);
        assert_eq!(got.data.unwrap()["x"], 1);
        assert_eq!(s.inflight_calls(), 0);
    }

    #[tokio::test]
    async fn nonzero_result_is_generic_failure() {
        let bus = Arc::new(LocalBus::new());
        let mut s = ready(&bus, json!({"o1": {"m1": {}}}));
        let (handle, rx) = DeferredReply::channel();
        let id = s
            .begin_call("o1", "m1", Map::new(), handle)
            .map_err(|(e, _)| e)
            .unwrap();
        let _ = sent(&mut s);
        s.on_frame(&reply(&json!(id), json!([3]))).unwrap();
        assert_eq!(rx.await.unwrap().status, BusStatus::UnknownError);
    }

    #[test]
    fn call_while_outbound_pending_is_busy() {
        let bus = Arc::new(LocalBus::new());
        let mut s = ready(&bus, json!({"o1": {"m1": {}}}));
        let (first, _rx1) = DeferredReply::channel();
        let _ = s.begin_call("o1", "m1", Map::new(), first).map_err(|(e, _)| e).unwrap();
        let (second, _rx2) = DeferredReply::channel();
        let (err, _handle) = s.begin_call("o1", "m1", Map::new(), second).unwrap_err();
        assert_matches!(err, FederationError::Busy);
        assert_eq!(s.inflight_calls(), 1);
    }

    #[test]
    fn exhausted_slots_reject_without_allocating() {
        let bus = Arc::new(LocalBus::new());
        let mut s = session_with(&bus, 2);
        s.establish().unwrap();
        let login = sent(&mut s);
        s.on_frame(&reply(&login["id"], json!([0, {"ubus_rpc_session": "t"}])))
            .unwrap();
        let sub = sent(&mut s);
        s.on_frame(&reply(&sub["id"], json!([0]))).unwrap();
        let list = sent(&mut s);
        s.on_frame(&reply(&list["id"], json!([0, {"o1": {"m1": {}}}]))).unwrap();

        let mut receivers = Vec::new();
        for _ in 0..2 {
            let (handle, rx) = DeferredReply::channel();
            let _ = s.begin_call("o1", "m1", Map::new(), handle).map_err(|(e, _)| e).unwrap();
            let _ = sent(&mut s);
            receivers.push(rx);
        }
        let (handle, _rx) = DeferredReply::channel();
        let (err, _handle) = s.begin_call("o1", "m1", Map::new(), handle).unwrap_err();
        assert_matches!(err, FederationError::ResourceExhausted { limit: 2 });
        assert_eq!(err.status(), BusStatus::NotSupported);
        assert_eq!(s.inflight_calls(), 2);
        assert!(!s.has_outbound());
    }

    #[test]
    fn call_before_ready_is_rejected() {
        let bus = Arc::new(LocalBus::new());
        let mut s = session_with(&bus, 20);
        s.establish().unwrap();
        let (handle, _rx) = DeferredReply::channel();
        let (err, _) = s.begin_call("o1", "m1", Map::new(), handle).unwrap_err();
        assert_matches!(err, FederationError::NotReady(SessionState::LoginSent));
    }

    // ── Termination ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn terminate_fails_calls_and_removes_stubs() {
        let bus = Arc::new(LocalBus::new());
        let mut s = ready(&bus, json!({"o1": {"m1": {}}, "o2": {}}));
        let (handle, rx) = DeferredReply::channel();
        let _ = s.begin_call("o1", "m1", Map::new(), handle).map_err(|(e, _)| e).unwrap();

        s.terminate();
        assert_eq!(s.state(), SessionState::Closed);
        assert_eq!(bus.object_count(), 0);
        assert_eq!(s.inflight_calls(), 0);
        assert!(!s.has_outbound());
        assert_eq!(rx.await.unwrap().status, BusStatus::UnknownError);

        s.terminate();
        assert_eq!(s.state(), SessionState::Closed);
        let (handle, _rx) = DeferredReply::channel();
        let (err, _) = s.begin_call("o1", "m1", Map::new(), handle).unwrap_err();
        assert_matches!(err, FederationError::Disconnected);
    }
}
