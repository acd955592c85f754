//! Token revocation.
//!
//! Revoking a token that does not exist succeeds. Without a hint both stores
//! are tried.

use crate::errors::OAuthError;
use crate::oauth::deadline::storage;
use crate::oauth::types::TokenTypeHint;
use crate::storage::traits::OAuthStorage;
use std::sync::Arc;
use std::time::Duration;

pub struct RevocationEngine {
    storage: Arc<dyn OAuthStorage>,
    timeout: Duration,
    /// Also delete refresh tokens issued alongside a revoked access token
    cascade_refresh_tokens: bool,
}

impl RevocationEngine {
    pub fn new(storage: Arc<dyn OAuthStorage>, timeout: Duration) -> Self {
        Self {
            storage,
            timeout,
            cascade_refresh_tokens: false,
        }
    }

    pub fn with_cascade(mut self, cascade_refresh_tokens: bool) -> Self {
        self.cascade_refresh_tokens = cascade_refresh_tokens;
        self
    }

    /// Parse the raw hint and revoke
    pub async fn revoke_with_hint(
        &self,
        token: &str,
        token_type_hint: Option<&str>,
    ) -> Result<(), OAuthError> {
        let hint = TokenTypeHint::parse(token_type_hint).map_err(OAuthError::UnsupportedTokenType)?;
        self.revoke(token, hint).await
    }

    pub async fn revoke(
        &self,
        token: &str,
        token_type_hint: Option<TokenTypeHint>,
    ) -> Result<(), OAuthError> {
        if token.is_empty() {
            return Err(OAuthError::InvalidRequest("token is required".to_string()));
        }

        if matches!(token_type_hint, None | Some(TokenTypeHint::AccessToken)) {
            storage(
                self.timeout,
                "access token revocation",
                self.storage.revoke_token(token),
            )
            .await?;

            if self.cascade_refresh_tokens {
                let revoked = storage(
                    self.timeout,
                    "refresh token cascade",
                    self.storage.revoke_refresh_tokens_for_access_token(token),
                )
                .await?;
                if revoked > 0 {
                    tracing::info!(revoked, "Revoked refresh tokens issued with access token");
                }
            }
        }

        if matches!(token_type_hint, None | Some(TokenTypeHint::RefreshToken)) {
            storage(
                self.timeout,
                "refresh token revocation",
                self.storage.revoke_refresh_token(token),
            )
            .await?;
        }

        tracing::info!(
            hint = token_type_hint.map(|h| h.as_str()).unwrap_or("none"),
            "Revoked token"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::types::{AccessToken, RefreshToken};
    use crate::storage::MemoryOAuthStorage;
    use crate::storage::traits::{AccessTokenStore, RefreshTokenStore};
    use chrono::{Duration as ChronoDuration, Utc};

    async fn seeded() -> Arc<MemoryOAuthStorage> {
        let storage = Arc::new(MemoryOAuthStorage::new());
        let now = Utc::now();
        let access = AccessToken {
            token: "at".to_string(),
            client_id: "acme".to_string(),
            user_id: Some("u1".to_string()),
            scope: None,
            created_at: now,
            expires_at: now + ChronoDuration::hours(1),
        };
        let refresh = RefreshToken {
            token: "rt".to_string(),
            access_token: "at".to_string(),
            client_id: "acme".to_string(),
            user_id: "u1".to_string(),
            scope: None,
            created_at: now,
            expires_at: now + ChronoDuration::days(1),
        };
        storage.store_token_pair(&access, Some(&refresh)).await.unwrap();
        storage
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let storage = seeded().await;
        let engine = RevocationEngine::new(storage.clone(), Duration::from_secs(5));

        engine.revoke_with_hint("at", Some("access_token")).await.unwrap();
        assert!(storage.get_token("at").await.unwrap().is_none());
        engine.revoke_with_hint("at", Some("access_token")).await.unwrap();
        engine.revoke_with_hint("missing", None).await.unwrap();

        assert!(storage.get_refresh_token("rt").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_empty_hint_tries_both_stores() {
        let storage = seeded().await;
        let engine = RevocationEngine::new(storage.clone(), Duration::from_secs(5));

        engine.revoke_with_hint("rt", Some("")).await.unwrap();
        assert!(storage.get_refresh_token("rt").await.unwrap().is_none());
        assert!(storage.get_token("at").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_hint_is_rejected() {
        let storage = seeded().await;
        let engine = RevocationEngine::new(storage.clone(), Duration::from_secs(5));

        assert!(matches!(
            engine.revoke_with_hint("at", Some("id_token")).await,
            Err(OAuthError::UnsupportedTokenType(_))
        ));
        assert!(storage.get_token("at").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cascade_removes_lineage() {
        let storage = seeded().await;
        let engine =
            RevocationEngine::new(storage.clone(), Duration::from_secs(5)).with_cascade(true);

        engine
            .revoke("at", Some(TokenTypeHint::AccessToken))
            .await
            .unwrap();
        assert!(storage.get_refresh_token("rt").await.unwrap().is_none());
    }
}
