//! Token introspection.
//!
//! Unknown or expired tokens are a normal `{"active": false}` answer.

use crate::errors::OAuthError;
use crate::oauth::deadline::storage;
use crate::oauth::types::*;
use crate::storage::traits::OAuthStorage;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

pub struct IntrospectionEngine {
    storage: Arc<dyn OAuthStorage>,
    timeout: Duration,
}

impl IntrospectionEngine {
    pub fn new(storage: Arc<dyn OAuthStorage>, timeout: Duration) -> Self {
        Self { storage, timeout }
    }

    /// Look the token up as an access token, then as a refresh token.
    ///
    /// The hint is accepted but does not change the lookup order.
    pub async fn introspect(
        &self,
        token: &str,
        _token_type_hint: Option<TokenTypeHint>,
    ) -> Result<IntrospectionResponse, OAuthError> {
        if token.is_empty() {
            return Ok(IntrospectionResponse::inactive());
        }
        let now = Utc::now();

        if let Some(access) =
            storage(self.timeout, "access token lookup", self.storage.get_token(token)).await?
        {
            tracing::debug!(client_id = %access.client_id, "Introspected access token");
            return Ok(IntrospectionResponse {
                active: now < access.expires_at,
                scope: access.scope,
                client_id: Some(access.client_id),
                exp: Some(access.expires_at.timestamp()),
                iat: Some(access.created_at.timestamp()),
                sub: access.user_id,
                token_type: Some(TokenTypeHint::AccessToken.as_str().to_string()),
            });
        }

        if let Some(refresh) = storage(
            self.timeout,
            "refresh token lookup",
            self.storage.get_refresh_token(token),
        )
        .await?
        {
            tracing::debug!(client_id = %refresh.client_id, "Introspected refresh token");
            return Ok(IntrospectionResponse {
                active: now < refresh.expires_at,
                scope: refresh.scope,
                client_id: Some(refresh.client_id),
                exp: Some(refresh.expires_at.timestamp()),
                iat: Some(refresh.created_at.timestamp()),
                sub: Some(refresh.user_id),
                token_type: Some(TokenTypeHint::RefreshToken.as_str().to_string()),
            });
        }

        tracing::debug!("Introspected unknown token");
        Ok(IntrospectionResponse::inactive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryOAuthStorage;
    use crate::storage::traits::RefreshTokenStore;
    use chrono::Duration as ChronoDuration;

    fn access(token: &str, lifetime: ChronoDuration) -> AccessToken {
        let created_at = Utc::now() - ChronoDuration::hours(2);
        AccessToken {
            token: token.to_string(),
            client_id: "acme".to_string(),
            user_id: Some("u1".to_string()),
            scope: Some("read".to_string()),
            created_at,
            expires_at: created_at + lifetime,
        }
    }

    async fn engine() -> (IntrospectionEngine, Arc<MemoryOAuthStorage>) {
        let storage = Arc::new(MemoryOAuthStorage::new());
        (
            IntrospectionEngine::new(storage.clone(), Duration::from_secs(5)),
            storage,
        )
    }

    #[tokio::test]
    async fn test_live_and_expired_access_tokens() {
        let (engine, storage) = engine().await;
        storage
            .store_token_pair(&access("live", ChronoDuration::hours(3)), None)
            .await
            .unwrap();
        storage
            .store_token_pair(&access("expired", ChronoDuration::hours(1)), None)
            .await
            .unwrap();

        let live = engine.introspect("live", None).await.unwrap();
        assert!(live.active);
        assert_eq!(live.client_id.as_deref(), Some("acme"));
        assert_eq!(live.sub.as_deref(), Some("u1"));
        assert_eq!(live.token_type.as_deref(), Some("access_token"));

        let expired = engine
            .introspect("expired", Some(TokenTypeHint::RefreshToken))
            .await
            .unwrap();
        assert!(!expired.active);
        assert_eq!(expired.client_id.as_deref(), Some("acme"));
    }

    #[tokio::test]
    async fn test_refresh_token_found_regardless_of_hint() {
        let (engine, storage) = engine().await;
        let access_token = access("at", ChronoDuration::hours(3));
        let refresh = RefreshToken {
            token: "rt".to_string(),
            access_token: "at".to_string(),
            client_id: "acme".to_string(),
            user_id: "u1".to_string(),
            scope: None,
            created_at: Utc::now(),
            expires_at: Utc::now() + ChronoDuration::days(1),
        };
        storage
            .store_token_pair(&access_token, Some(&refresh))
            .await
            .unwrap();

        let response = engine
            .introspect("rt", Some(TokenTypeHint::AccessToken))
            .await
            .unwrap();
        assert!(response.active);
        assert_eq!(response.token_type.as_deref(), Some("refresh_token"));
    }

    #[tokio::test]
    async fn test_unknown_token_is_inactive() {
        let (engine, _) = engine().await;
        assert_eq!(
            engine.introspect("nope", None).await.unwrap(),
            IntrospectionResponse::inactive()
        );
        assert!(!engine.introspect("", None).await.unwrap().active);
    }
}
