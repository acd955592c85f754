//! Time-bounded collaborator calls.
//!
//! Dropping the inner future on timeout also drops any open transaction,
//! which rolls it back.

use crate::errors::{OAuthError, StorageError};
use std::future::Future;
use std::time::Duration;

/// Run `future` with an upper bound; a timeout becomes `TemporarilyUnavailable`.
pub(crate) async fn bounded<F: Future>(
    limit: Duration,
    operation: &'static str,
    future: F,
) -> Result<F::Output, OAuthError> {
    tokio::time::timeout(limit, future).await.map_err(|_| {
        tracing::warn!(
            operation,
            timeout_ms = limit.as_millis() as u64,
            "Collaborator call timed out"
        );
        OAuthError::TemporarilyUnavailable(format!("{} timed out", operation))
    })
}

/// [`bounded`] for storage calls; storage failures become `ServerError`.
pub(crate) async fn storage<T, F>(
    limit: Duration,
    operation: &'static str,
    future: F,
) -> Result<T, OAuthError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    bounded(limit, operation, future).await?.map_err(|e| {
        tracing::error!(operation, error = ?e, "Storage call failed");
        OAuthError::ServerError(format!("{} failed", operation))
    })
}
