//! Subscription lifecycle and event fan-out.
//!
//! Each subscription registers its own bus event handler. When the bus
//! emits a matching event the handler copies it into a
//! [`PendingAccessCheck`] on the subscriber's connection; delivery happens
//! once the access policy allows it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use metrics::gauge;
use tokio::runtime::Handle;
use tracing::{debug, warn};
use wsubus_core::{AccessPolicy, Bus, BusEvent, ConnectionId, EventHandler};
use wsubus_rpc::SubscriptionRef;

use super::access_check::PendingAccessCheck;
use super::registry::{Subscription, SubscriptionRegistry};
use crate::errors::SubscriptionError;
use crate::metrics::SUBSCRIPTIONS_ACTIVE;
use crate::websocket::connection::ClientConnection;

/// Bus handler forwarding events to one subscriber.
struct SubscriptionHandler {
    conn: Weak<ClientConnection>,
    subscription: SubscriptionRef,
    policy: Arc<dyn AccessPolicy>,
    timeout: Option<Duration>,
    runtime: Handle,
}

impl EventHandler for SubscriptionHandler {
    fn on_event(&self, event: &BusEvent) {
        let Some(conn) = self.conn.upgrade() else {
            return;
        };
        let check = PendingAccessCheck {
            event_type: event.event_type.clone(),
            data: event.data.clone(),
            subscription: self.subscription.clone(),
            session: conn.sid().unwrap_or_default(),
        };
        check.spawn(conn, Arc::clone(&self.policy), self.timeout, &self.runtime);
    }
}

/// Owns every client subscription.
pub struct SubscriptionEngine {
    bus: Arc<dyn Bus>,
    policy: Arc<dyn AccessPolicy>,
    access_check_timeout: Option<Duration>,
    next_id: AtomicU32,
    registry: SubscriptionRegistry,
}

impl SubscriptionEngine {
    /// Create an engine listening on `bus` and gating events with `policy`.
    pub fn new(
        bus: Arc<dyn Bus>,
        policy: Arc<dyn AccessPolicy>,
        access_check_timeout: Option<Duration>,
    ) -> Self {
        Self {
            bus,
            policy,
            access_check_timeout,
            next_id: AtomicU32::new(1),
            registry: SubscriptionRegistry::new(),
        }
    }

    /// Subscribe `conn` to events matching `pattern`. Returns the new id.
    pub fn subscribe(
        &self,
        conn: &Arc<ClientConnection>,
        sid: &str,
        pattern: &str,
    ) -> Result<u32, SubscriptionError> {
        if !conn.check_and_update_sid(sid) {
            return Err(SubscriptionError::SessionMismatch);
        }
        let runtime = Handle::try_current().map_err(|_| SubscriptionError::NoRuntime)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handler = SubscriptionHandler {
            conn: Arc::downgrade(conn),
            subscription: SubscriptionRef {
                pattern: pattern.to_owned(),
                id,
            },
            policy: Arc::clone(&self.policy),
            timeout: self.access_check_timeout,
            runtime,
        };
        let handler_id = self.bus.register_event_handler(pattern, Arc::new(handler))?;
        self.registry.push(Subscription {
            id,
            pattern: pattern.to_owned(),
            conn_id: conn.id.clone(),
            handler_id,
        });
        gauge!(SUBSCRIPTIONS_ACTIVE).increment(1.0);
        debug!(conn_id = %conn.id, sub_id = id, pattern, "subscribed");
        Ok(id)
    }

    /// Remove the connection's subscription with `id`.
    pub fn unsubscribe_by_id(
        &self,
        conn: &ClientConnection,
        sid: &str,
        id: u32,
    ) -> Result<(), SubscriptionError> {
        if !conn.check_and_update_sid(sid) {
            return Err(SubscriptionError::SessionMismatch);
        }
        let removed = self
            .registry
            .remove_where(|s| s.id == id && s.conn_id == conn.id);
        self.release(&removed, &conn.id)?;
        cancel_checks(conn, &removed);
        Ok(())
    }

    /// Remove every subscription of the connection made with `pattern`.
    pub fn unsubscribe_by_pattern(
        &self,
        conn: &ClientConnection,
        sid: &str,
        pattern: &str,
    ) -> Result<(), SubscriptionError> {
        if !conn.check_and_update_sid(sid) {
            return Err(SubscriptionError::SessionMismatch);
        }
        let removed = self
            .registry
            .remove_where(|s| s.pattern == pattern && s.conn_id == conn.id);
        self.release(&removed, &conn.id)?;
        cancel_checks(conn, &removed);
        Ok(())
    }

    /// Remove everything a connection subscribed to. Returns the count.
    pub fn unsubscribe_all(&self, conn_id: &ConnectionId) -> usize {
        let removed = self.registry.remove_where(|s| &s.conn_id == conn_id);
        let _ = self.release(&removed, conn_id);
        removed.len()
    }

    /// The connection's subscriptions, oldest first.
    pub fn list(
        &self,
        conn: &ClientConnection,
        sid: &str,
    ) -> Result<Vec<SubscriptionRef>, SubscriptionError> {
        if !conn.check_and_update_sid(sid) {
            return Err(SubscriptionError::SessionMismatch);
        }
        Ok(self.registry.for_connection(&conn.id))
    }

    /// Drop every remaining subscription. Called at shutdown.
    pub fn clear_all(&self) -> usize {
        let removed = self.registry.drain();
        if !removed.is_empty() {
            warn!("{} subscriptions cleaned at exit", removed.len());
        }
        for sub in &removed {
            self.unregister(sub);
        }
        gauge!(SUBSCRIPTIONS_ACTIVE).set(0.0);
        removed.len()
    }

    /// Total subscriptions across all connections.
    pub fn count(&self) -> usize {
        self.registry.len()
    }

    fn release(
        &self,
        removed: &[Subscription],
        conn_id: &ConnectionId,
    ) -> Result<(), SubscriptionError> {
        if removed.is_empty() {
            return Err(SubscriptionError::NotFound);
        }
        for sub in removed {
            self.unregister(sub);
            debug!(conn_id = %conn_id, sub_id = sub.id, pattern = %sub.pattern, "unsubscribed");
        }
        #[allow(clippy::cast_precision_loss)]
        gauge!(SUBSCRIPTIONS_ACTIVE).decrement(removed.len() as f64);
        Ok(())
    }

    fn unregister(&self, sub: &Subscription) {
        if let Err(e) = self.bus.unregister_event_handler(sub.handler_id) {
            warn!(sub_id = sub.id, error = %e, "failed to unregister event handler");
        }
    }
}

/// Cancel access checks still in flight for removed subscriptions.
fn cancel_checks(conn: &ClientConnection, removed: &[Subscription]) {
    for sub in removed {
        let canceled = conn.checks().cancel_for(sub.id);
        if canceled > 0 {
            debug!(conn_id = %conn.id, sub_id = sub.id, canceled, "pending access checks canceled");
        }
    }
}
