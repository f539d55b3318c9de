//! Cancellation for reconciler and migration entry points
//!
//! Every entry point takes a [`CancellationToken`]. Cancelling it drops the
//! in-flight Kubernetes call and returns [`Error::Cancelled`] to the caller.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::Error;

/// Run `operation` until it completes or `token` is cancelled
///
/// An already-cancelled token wins over a ready operation, so no new calls
/// are issued once cancellation has been requested.
pub async fn run_cancellable<F, T>(token: &CancellationToken, operation: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Cancelled),
        result = operation => result,
    }
}
