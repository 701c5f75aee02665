//! Optional deadlines.

use std::future::Future;
use std::time::Duration;

/// Await `fut`, giving up after `limit` when one is set.
///
/// Returns `None` on timeout.
pub(crate) async fn with_optional_timeout<F: Future>(
    limit: Option<Duration>,
    fut: F,
) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}
