//! Asynchronous, cancelable access checks in front of event delivery.
//!
//! Every matched event becomes a [`PendingAccessCheck`]: an owned copy of
//! the event plus the subscription it matched. The check is queued on the
//! connection's [`AccessCheckQueue`] and resolved by the policy on a
//! spawned task. Closing the connection cancels every queued check and
//! removing a subscription cancels the checks raised for it. A canceled
//! check never forwards.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use wsubus_core::AccessPolicy;
use wsubus_rpc::{EventNotification, SubscriptionRef};

use crate::metrics::{EVENTS_DENIED_TOTAL, EVENTS_FORWARDED_TOTAL};
use crate::timeout::with_optional_timeout;
use crate::websocket::connection::ClientConnection;

struct PendingCheck {
    sub_id: u32,
    cancel: CancellationToken,
}

#[derive(Default)]
struct QueueState {
    next_id: u64,
    pending: BTreeMap<u64, PendingCheck>,
    retired: BTreeSet<u32>,
    closed: bool,
}

/// Ordered set of a connection's outstanding access checks.
///
/// Each check is tagged with the subscription it was raised for, so
/// removing a subscription cancels the checks still waiting on its behalf.
#[derive(Default)]
pub struct AccessCheckQueue {
    state: Mutex<QueueState>,
}

impl AccessCheckQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a check for subscription `sub_id`. Returns `None` once the
    /// queue has been closed or the subscription retired.
    pub fn enqueue(&self, sub_id: u32) -> Option<(u64, CancellationToken)> {
        let mut state = self.state.lock();
        if state.closed || state.retired.contains(&sub_id) {
            return None;
        }
        state.next_id += 1;
        let id = state.next_id;
        let cancel = CancellationToken::new();
        let _ = state.pending.insert(
            id,
            PendingCheck {
                sub_id,
                cancel: cancel.clone(),
            },
        );
        Some((id, cancel))
    }

    /// Remove a finished check.
    pub fn complete(&self, id: u64) {
        let _ = self.state.lock().pending.remove(&id);
    }

    /// Retire subscription `sub_id`: cancel its queued checks and refuse
    /// new ones. Returns how many were canceled.
    pub fn cancel_for(&self, sub_id: u32) -> usize {
        let canceled: Vec<PendingCheck> = {
            let mut state = self.state.lock();
            let _ = state.retired.insert(sub_id);
            let ids: Vec<u64> = state
                .pending
                .iter()
                .filter(|(_, check)| check.sub_id == sub_id)
                .map(|(id, _)| *id)
                .collect();
            ids.iter()
                .filter_map(|id| state.pending.remove(id))
                .collect()
        };
        for check in &canceled {
            check.cancel.cancel();
        }
        canceled.len()
    }

    /// Cancel every queued check and refuse new ones. Returns how many were
    /// canceled.
    pub fn cancel_all(&self) -> usize {
        let pending = {
            let mut state = self.state.lock();
            state.closed = true;
            std::mem::take(&mut state.pending)
        };
        for check in pending.values() {
            check.cancel.cancel();
        }
        pending.len()
    }

    /// Number of outstanding checks.
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }
}

/// An event waiting for the policy's verdict.
pub struct PendingAccessCheck {
    /// Event type.
    pub event_type: String,
    /// Owned copy of the payload.
    pub data: Map<String, Value>,
    /// Subscription that matched.
    pub subscription: SubscriptionRef,
    /// Session the policy is asked about.
    pub session: String,
}

impl PendingAccessCheck {
    /// Queue the check on `conn` and resolve it on `runtime`.
    ///
    /// Does nothing if the connection is already closing.
    pub fn spawn(
        self,
        conn: Arc<ClientConnection>,
        policy: Arc<dyn AccessPolicy>,
        timeout: Option<Duration>,
        runtime: &tokio::runtime::Handle,
    ) {
        let Some((check_id, cancel)) = conn.checks().enqueue(self.subscription.id) else {
            trace!(conn_id = %conn.id, "connection closing or subscription gone, event not checked");
            return;
        };
        drop(runtime.spawn(async move {
            let verdict = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                allowed = with_optional_timeout(
                    timeout,
                    policy.check_event(&self.event_type, &self.session),
                ) => Some(allowed.unwrap_or(false)),
            };
            conn.checks().complete(check_id);
            self.finish(&conn, verdict);
        }));
    }

    fn finish(self, conn: &ClientConnection, verdict: Option<bool>) {
        match verdict {
            None => trace!(conn_id = %conn.id, event = %self.event_type, "access check canceled"),
            Some(false) => {
                debug!(
                    conn_id = %conn.id,
                    event = %self.event_type,
                    sub_id = self.subscription.id,
                    "access check for event denied"
                );
                counter!(EVENTS_DENIED_TOTAL).increment(1);
            }
            Some(true) => {
                let notification =
                    EventNotification::new(self.event_type, self.data, self.subscription);
                match serde_json::to_string(&notification) {
                    Ok(text) => {
                        if conn.send(Arc::new(text)) {
                            counter!(EVENTS_FORWARDED_TOTAL).increment(1);
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to serialize event"),
                }
            }
        }
    }
}
