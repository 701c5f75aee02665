//! Shared state handed to every connection.

use std::sync::Arc;
use std::time::Instant;

use wsubus_core::{AccessPolicy, Bus};

use crate::config::ServerConfig;
use crate::subscription::SubscriptionEngine;
use crate::websocket::registry::ConnectionRegistry;

/// Dependencies of the request dispatcher.
pub struct ServerContext {
    /// Bus answering `call`, `list`, and event subscriptions.
    pub bus: Arc<dyn Bus>,
    /// Bus answering `dlist` (None = `dlist` is unsupported).
    pub secondary_bus: Option<Arc<dyn Bus>>,
    /// Client subscriptions.
    pub subscriptions: SubscriptionEngine,
    /// Live connections.
    pub connections: ConnectionRegistry,
    /// Server configuration.
    pub config: ServerConfig,
    /// When the server started (for uptime calculation).
    pub start_time: Instant,
}

impl ServerContext {
    /// Build a context around `bus`, gating events with `policy`.
    pub fn new(bus: Arc<dyn Bus>, policy: Arc<dyn AccessPolicy>, config: ServerConfig) -> Self {
        let subscriptions =
            SubscriptionEngine::new(Arc::clone(&bus), policy, config.access_check_timeout);
        Self {
            bus,
            secondary_bus: None,
            subscriptions,
            connections: ConnectionRegistry::new(),
            config,
            start_time: Instant::now(),
        }
    }

    /// Attach the bus used for `dlist`.
    #[must_use]
    pub fn with_secondary_bus(mut self, bus: Arc<dyn Bus>) -> Self {
        self.secondary_bus = Some(bus);
        self
    }
}
