//! Local proxy objects standing in for a peer's objects.
//!
//! A stub for remote object `o` on peer `host` is registered on the local
//! bus as `host/o`, with the signature the peer advertised. Calls made on
//! the stub are forwarded to the peer under the unqualified name.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use metrics::gauge;
use serde_json::Value;
use tracing::{debug, warn};
use wsubus_core::{Bus, BusCall, BusError, DeferredReply, ObjectHandler, ObjectSignature};

use crate::errors::FederationError;
use crate::link::FederationLink;

/// Local name of remote object `object` on `peer`.
pub fn qualified_name(peer: &str, object: &str) -> String {
    format!("{peer}/{object}")
}

/// A mirrored remote object.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteStub {
    /// Name on the local bus.
    pub local_name: String,
    /// Name on the peer.
    pub remote_name: String,
    /// Advertised method table.
    pub signature: ObjectSignature,
}

/// Forwards calls on a stub to the owning link.
pub(crate) struct StubCallHandler {
    link: Weak<FederationLink>,
    remote_object: String,
}

impl ObjectHandler for StubCallHandler {
    fn handle(&self, call: BusCall, reply: DeferredReply) {
        match self.link.upgrade() {
            Some(link) => link.proxy_call(&self.remote_object, call, reply),
            None => {
                let _ = reply.fail(FederationError::Disconnected.status());
            }
        }
    }
}

/// Stubs owned by one federation session, keyed by remote object name.
pub struct StubRegistry {
    peer: String,
    bus: Arc<dyn Bus>,
    link: Weak<FederationLink>,
    stubs: BTreeMap<String, RemoteStub>,
}

impl StubRegistry {
    pub(crate) fn new(peer: String, bus: Arc<dyn Bus>, link: Weak<FederationLink>) -> Self {
        Self {
            peer,
            bus,
            link,
            stubs: BTreeMap::new(),
        }
    }

    /// Mirror `object` with the advertised `signature`.
    ///
    /// A remote object already mirrored is left untouched.
    pub fn create(&mut self, object: &str, signature: &Value) -> Result<bool, FederationError> {
        if self.stubs.contains_key(object) {
            return Ok(false);
        }
        let signature = ObjectSignature::from_wire(object, signature)?;
        let local_name = qualified_name(&self.peer, object);
        let handler = Arc::new(StubCallHandler {
            link: self.link.clone(),
            remote_object: object.to_owned(),
        });
        let _ = self
            .bus
            .add_object(&local_name, signature.clone(), handler)?;

        debug!(peer = %self.peer, object = %local_name, methods = signature.len(), "stub created");
        let _ = self.stubs.insert(
            object.to_owned(),
            RemoteStub {
                local_name,
                remote_name: object.to_owned(),
                signature,
            },
        );
        self.record_gauge();
        Ok(true)
    }

    /// Remove the stub for `object`. Unknown names are ignored.
    pub fn destroy(&mut self, object: &str) -> bool {
        let Some(stub) = self.stubs.remove(object) else {
            return false;
        };
        self.unregister(&stub);
        self.record_gauge();
        true
    }

    /// Remove every stub. Returns how many were removed.
    pub fn destroy_all(&mut self) -> usize {
        let stubs = std::mem::take(&mut self.stubs);
        for stub in stubs.values() {
            self.unregister(stub);
        }
        self.record_gauge();
        stubs.len()
    }

    /// Remove every stub whose remote object fails `keep`. Returns how
    /// many were removed.
    pub fn retain(&mut self, keep: impl Fn(&str) -> bool) -> usize {
        let stale: Vec<String> = self
            .stubs
            .keys()
            .filter(|object| !keep(object))
            .cloned()
            .collect();
        for object in &stale {
            let _ = self.destroy(object);
        }
        stale.len()
    }

    /// Whether `object` is mirrored.
    pub fn contains(&self, object: &str) -> bool {
        self.stubs.contains_key(object)
    }

    /// Local names of all stubs.
    pub fn local_names(&self) -> Vec<String> {
        self.stubs.values().map(|s| s.local_name.clone()).collect()
    }

    /// Number of stubs.
    pub fn len(&self) -> usize {
        self.stubs.len()
    }

    /// Whether there are no stubs.
    pub fn is_empty(&self) -> bool {
        self.stubs.is_empty()
    }

    fn unregister(&self, stub: &RemoteStub) {
        match self.bus.remove_object(&stub.local_name) {
            Ok(()) => debug!(peer = %self.peer, object = %stub.local_name, "stub removed"),
            Err(BusError::ObjectNotFound(_)) => {}
            Err(e) => warn!(object = %stub.local_name, error = %e, "failed to remove stub"),
        }
    }

    fn record_gauge(&self) {
        #[allow(clippy::cast_precision_loss)]
        gauge!("federation_stubs_active", "peer" => self.peer.clone()).set(self.stubs.len() as f64);
    }
}
