//! Insertion-ordered subscription table.

use parking_lot::Mutex;
use wsubus_core::{ConnectionId, HandlerId};
use wsubus_rpc::SubscriptionRef;

/// One live subscription.
#[derive(Clone, Debug, PartialEq)]
pub struct Subscription {
    /// Process-unique id.
    pub id: u32,
    /// Event type pattern.
    pub pattern: String,
    /// Owning connection.
    pub conn_id: ConnectionId,
    /// Bus registration backing this subscription.
    pub handler_id: HandlerId,
}

impl Subscription {
    /// Wire identity of this subscription.
    pub fn to_ref(&self) -> SubscriptionRef {
        SubscriptionRef {
            pattern: self.pattern.clone(),
            id: self.id,
        }
    }
}

/// Every subscription across all connections, in creation order.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: Mutex<Vec<Subscription>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a subscription.
    pub fn push(&self, subscription: Subscription) {
        self.entries.lock().push(subscription);
    }

    /// Remove and return every entry matching `pred`, preserving order.
    pub fn remove_where(&self, mut pred: impl FnMut(&Subscription) -> bool) -> Vec<Subscription> {
        let mut entries = self.entries.lock();
        let mut removed = Vec::new();
        entries.retain(|s| {
            if pred(s) {
                removed.push(s.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Subscriptions owned by `conn_id`, in registry order.
    pub fn for_connection(&self, conn_id: &ConnectionId) -> Vec<SubscriptionRef> {
        self.entries
            .lock()
            .iter()
            .filter(|s| &s.conn_id == conn_id)
            .map(Subscription::to_ref)
            .collect()
    }

    /// Remove everything.
    pub fn drain(&self) -> Vec<Subscription> {
        std::mem::take(&mut *self.entries.lock())
    }

    /// Number of subscriptions.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
