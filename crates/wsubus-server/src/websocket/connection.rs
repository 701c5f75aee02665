//! Per-client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use wsubus_core::{CallSlots, ConnectionId, DEFAULT_SESSION_ID, SlotsExhausted};
use wsubus_rpc::RpcResponse;

use crate::subscription::access_check::AccessCheckQueue;

/// A connected WebSocket client.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// First session id the client presented.
    sid: Mutex<Option<String>>,
    /// Send channel to the client's write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has answered the last ping.
    pub is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    /// Frames dropped because the send queue was full.
    pub dropped_messages: AtomicU64,
    checks: AccessCheckQueue,
    calls: Mutex<CallSlots<u64, CancellationToken>>,
    next_call: AtomicU64,
}

impl ClientConnection {
    /// Create a connection allowing `max_inflight` concurrent calls.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>, max_inflight: usize) -> Self {
        let now = Instant::now();
        Self {
            id,
            sid: Mutex::new(None),
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            checks: AccessCheckQueue::new(),
            calls: Mutex::new(CallSlots::new(max_inflight)),
            next_call: AtomicU64::new(0),
        }
    }

    /// Check `sid` against the session this connection is bound to.
    ///
    /// The first sid seen binds the connection. A connection still bound to
    /// the default session may move to a real one; any other change is
    /// refused.
    pub fn check_and_update_sid(&self, sid: &str) -> bool {
        let mut bound = self.sid.lock();
        match bound.as_deref() {
            None => {
                *bound = Some(sid.to_owned());
                true
            }
            Some(current) if current == sid => true,
            Some(DEFAULT_SESSION_ID) => {
                *bound = Some(sid.to_owned());
                true
            }
            Some(_) => false,
        }
    }

    /// Session id the connection is bound to, if any.
    pub fn sid(&self) -> Option<String> {
        self.sid.lock().clone()
    }

    /// Outstanding access checks.
    pub fn checks(&self) -> &AccessCheckQueue {
        &self.checks
    }

    /// Reserve a call slot. The token fires when the connection closes.
    pub fn begin_call(&self) -> Result<(usize, CancellationToken), SlotsExhausted> {
        let mut calls = self.calls.lock();
        let slot = calls.acquire()?;
        let token = CancellationToken::new();
        let seq = self.next_call.fetch_add(1, Ordering::Relaxed);
        let _ = calls.bind(slot, seq, token.clone());
        Ok((slot, token))
    }

    /// Free a call slot.
    pub fn end_call(&self, slot: usize) {
        let _ = self.calls.lock().release(slot);
    }

    /// Calls currently in flight.
    pub fn inflight_calls(&self) -> usize {
        self.calls.lock().in_use()
    }

    /// Send a text frame.
    ///
    /// Returns `false` if the queue is full or closed, and counts the drop.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize and send a response.
    pub fn send_response(&self, response: &RpcResponse) -> bool {
        match serde_json::to_string(response) {
            Ok(json) => self.send(Arc::new(json)),
            Err(e) => {
                warn!(conn_id = %self.id, error = %e, "failed to serialize response");
                false
            }
        }
    }

    /// Total frames dropped.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Time since the last pong or activity.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Cancel pending access checks and in-flight calls.
    ///
    /// Returns how many access checks were canceled.
    pub fn close(&self) -> usize {
        let canceled = self.checks.cancel_all();
        let calls = self.calls.lock().drain();
        for token in &calls {
            token.cancel();
        }
        canceled
    }
}
