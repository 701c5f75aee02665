//! Live connection table.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use wsubus_core::ConnectionId;

use super::connection::ClientConnection;

/// Connected clients indexed by connection ID.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection.
    pub fn add(&self, connection: Arc<ClientConnection>) {
        let _ = self
            .connections
            .write()
            .insert(connection.id.clone(), connection);
    }

    /// Remove a connection, returning it if it was registered.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.write().remove(id)
    }

    /// Look up a connection.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.read().get(id).cloned()
    }

    /// Number of live connections.
    pub fn count(&self) -> usize {
        self.connections.read().len()
    }

    /// Close every connection and empty the table.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.connections.write().drain().map(|(_, c)| c).collect();
        for conn in &drained {
            let _ = conn.close();
        }
        drained.len()
    }
}
