//! Process-wide shutdown signal.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long tasks get to finish before they are aborted.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Fans one cancellation out to the server, its sessions, and federation
/// clients.
#[derive(Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// A token cancelled on shutdown.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Fire the signal. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether the signal has fired.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fire the signal and wait up to `timeout` for `handles`. Tasks still
    /// running afterwards are aborted.
    ///
    /// Returns `true` if every task finished in time.
    pub async fn drain(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        self.shutdown();
        info!(tasks = handles.len(), "draining tasks");

        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_ok()
        {
            return true;
        }
        warn!("shutdown timed out after {timeout:?}, aborting remaining tasks");
        for handle in aborts {
            handle.abort();
        }
        false
    }
}
