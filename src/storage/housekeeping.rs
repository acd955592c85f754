//! Periodic removal of expired codes and tokens.

use crate::errors::StorageError;
use crate::storage::traits::OAuthStorage;

/// Number of rows removed from each credential store
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub authorization_codes: usize,
    pub access_tokens: usize,
    pub refresh_tokens: usize,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.authorization_codes + self.access_tokens + self.refresh_tokens
    }
}

/// Delete expired authorization codes, access tokens and refresh tokens
pub async fn cleanup_expired_credentials(
    storage: &dyn OAuthStorage,
) -> Result<CleanupReport, StorageError> {
    let report = CleanupReport {
        authorization_codes: storage.cleanup_expired_codes().await?,
        access_tokens: storage.cleanup_expired_tokens().await?,
        refresh_tokens: storage.cleanup_expired_refresh_tokens().await?,
    };
    if report.total() > 0 {
        tracing::info!(
            authorization_codes = report.authorization_codes,
            access_tokens = report.access_tokens,
            refresh_tokens = report.refresh_tokens,
            "Removed expired credentials"
        );
    }
    Ok(report)
}
