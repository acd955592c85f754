//! Token endpoint grant dispatch.
//!
//! Supports `authorization_code` (with PKCE), `client_credentials` and
//! `refresh_token` with rotation. Security-relevant failures are logged in
//! detail and returned as generic `invalid_client` / `invalid_grant`.

use crate::errors::{ClientRegistrationError, OAuthError};
use crate::oauth::clients::ClientRegistry;
use crate::oauth::deadline::{bounded, storage};
use crate::oauth::jwt::{TokenGrant, TokenIssuer};
use crate::oauth::types::*;
use crate::storage::traits::OAuthStorage;
use axum::http::{HeaderMap, header::AUTHORIZATION};
use base64::prelude::*;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;

/// Client credentials presented to the token endpoint
#[derive(Clone)]
pub struct ClientAuthentication {
    pub client_id: String,
    pub client_secret: Option<String>,
}

/// Form data for token endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenForm {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
}

impl TryFrom<TokenForm> for TokenRequest {
    type Error = OAuthError;

    fn try_from(form: TokenForm) -> Result<Self, Self::Error> {
        let grant_type = form
            .grant_type
            .parse::<GrantType>()
            .map_err(OAuthError::UnsupportedGrantType)?;

        Ok(Self {
            grant_type,
            code: form.code,
            redirect_uri: form.redirect_uri,
            code_verifier: form.code_verifier,
            refresh_token: form.refresh_token,
            client_id: form.client_id,
            client_secret: form.client_secret,
            scope: form.scope,
        })
    }
}

/// Extract client authentication from the HTTP Basic header or form fields.
///
/// A present but malformed Basic header is an error rather than a fallback
/// to the form.
pub fn extract_client_auth(
    headers: &HeaderMap,
    client_id: Option<&str>,
    client_secret: Option<&str>,
) -> Result<Option<ClientAuthentication>, OAuthError> {
    if let Some(value) = headers.get(AUTHORIZATION) {
        let value = value
            .to_str()
            .map_err(|_| OAuthError::InvalidRequest("Malformed Authorization header".to_string()))?;
        if let Some(encoded) = value.strip_prefix("Basic ") {
            return parse_basic_credentials(encoded.trim()).map(Some);
        }
    }

    Ok(client_id
        .filter(|id| !id.is_empty())
        .map(|id| ClientAuthentication {
            client_id: id.to_string(),
            client_secret: client_secret.map(str::to_string),
        }))
}

fn parse_basic_credentials(encoded: &str) -> Result<ClientAuthentication, OAuthError> {
    let malformed = || OAuthError::InvalidRequest("Malformed Basic credentials".to_string());

    let decoded = BASE64_STANDARD.decode(encoded).map_err(|e| {
        tracing::warn!(error = ?e, "Basic credentials are not base64");
        malformed()
    })?;
    let credentials = String::from_utf8(decoded).map_err(|_| malformed())?;

    let parts: Vec<&str> = credentials.splitn(2, ':').collect();
    if parts.len() != 2 || parts[0].is_empty() {
        tracing::warn!("Basic credentials do not split into id and secret");
        return Err(malformed());
    }

    Ok(ClientAuthentication {
        client_id: parts[0].to_string(),
        client_secret: Some(parts[1].to_string()),
    })
}

/// base64url(SHA-256(verifier)) compared in constant time
pub fn verify_pkce(code_verifier: &str, code_challenge: &str, method: CodeChallengeMethod) -> bool {
    let computed = match method {
        CodeChallengeMethod::S256 => BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes())),
    };
    computed.as_bytes().ct_eq(code_challenge.as_bytes()).into()
}

/// Token engine configuration
#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub access_token_lifetime: chrono::Duration,
    pub refresh_token_lifetime: chrono::Duration,
    pub timeout: Duration,
}

pub struct TokenEngine {
    registry: Arc<ClientRegistry>,
    storage: Arc<dyn OAuthStorage>,
    issuer: Arc<TokenIssuer>,
    settings: TokenSettings,
}

/// Tokens minted for one grant, not yet persisted
struct MintedTokens {
    access_token: AccessToken,
    refresh_token: Option<RefreshToken>,
}

impl TokenEngine {
    pub fn new(
        registry: Arc<ClientRegistry>,
        storage: Arc<dyn OAuthStorage>,
        issuer: Arc<TokenIssuer>,
        settings: TokenSettings,
    ) -> Self {
        Self {
            registry,
            storage,
            issuer,
            settings,
        }
    }

    /// Handle token requests
    pub async fn token(
        &self,
        request: TokenRequest,
        client_auth: Option<ClientAuthentication>,
    ) -> Result<TokenResponse, OAuthError> {
        let started = Instant::now();
        let grant_type = request.grant_type;

        let result = match grant_type {
            GrantType::AuthorizationCode => {
                self.handle_authorization_code_grant(request, client_auth).await
            }
            GrantType::ClientCredentials => {
                self.handle_client_credentials_grant(request, client_auth).await
            }
            GrantType::RefreshToken => self.handle_refresh_token_grant(request, client_auth).await,
            GrantType::Implicit | GrantType::Password => Err(OAuthError::UnsupportedGrantType(
                grant_type.to_string(),
            )),
        };

        match &result {
            Ok(_) => tracing::info!(
                grant_type = %grant_type,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Issued tokens"
            ),
            Err(e) => tracing::warn!(
                grant_type = %grant_type,
                error_code = e.error_code(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Token request rejected"
            ),
        }
        result
    }

    /// Handle authorization code grant
    async fn handle_authorization_code_grant(
        &self,
        request: TokenRequest,
        client_auth: Option<ClientAuthentication>,
    ) -> Result<TokenResponse, OAuthError> {
        let client_auth = client_auth
            .ok_or_else(|| OAuthError::InvalidClient("Missing client credentials".to_string()))?;
        let code_value = request
            .code
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidRequest("Missing authorization code".to_string()))?;
        let redirect_uri = request
            .redirect_uri
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidRequest("Missing redirect URI".to_string()))?;

        let client = self
            .authenticate_client(&client_auth, GrantType::AuthorizationCode)
            .await?;

        let code = storage(self.settings.timeout, "code lookup", self.storage.get_code(code_value))
            .await?
            .ok_or_else(|| {
                tracing::warn!(client_id = %client.client_id, "Unknown authorization code");
                invalid_grant()
            })?;

        if code.used {
            tracing::warn!(client_id = %client.client_id, "Authorization code replayed");
            return Err(invalid_grant());
        }
        if code.is_expired(Utc::now()) {
            tracing::warn!(client_id = %client.client_id, "Authorization code expired");
            return Err(invalid_grant());
        }
        if code.client_id != client.client_id {
            tracing::warn!(client_id = %client.client_id, code_client_id = %code.client_id, "Authorization code issued to another client");
            return Err(invalid_grant());
        }
        if code.redirect_uri != redirect_uri {
            tracing::warn!(client_id = %client.client_id, "Redirect URI does not match authorization code");
            return Err(invalid_grant());
        }

        if let Some(challenge) = &code.code_challenge {
            let method = code.code_challenge_method.unwrap_or(CodeChallengeMethod::S256);
            let verified = request
                .code_verifier
                .as_deref()
                .map(|verifier| verify_pkce(verifier, challenge, method))
                .unwrap_or(false);
            if !verified {
                tracing::warn!(client_id = %client.client_id, "PKCE verification failed");
                return Err(invalid_grant());
            }
        }

        let consumed = storage(
            self.settings.timeout,
            "code consumption",
            self.storage.mark_code_used(&code.code),
        )
        .await?;
        if !consumed {
            tracing::warn!(client_id = %client.client_id, "Authorization code already redeemed");
            return Err(invalid_grant());
        }

        let with_refresh = client.supports_grant(GrantType::RefreshToken);
        let minted = self.mint(
            &client.client_id,
            Some(&code.user_id),
            code.scope.as_deref(),
            with_refresh,
        )?;
        storage(
            self.settings.timeout,
            "token persistence",
            self.storage
                .store_token_pair(&minted.access_token, minted.refresh_token.as_ref()),
        )
        .await?;

        Ok(self.response(minted))
    }

    /// Handle client credentials grant
    async fn handle_client_credentials_grant(
        &self,
        request: TokenRequest,
        client_auth: Option<ClientAuthentication>,
    ) -> Result<TokenResponse, OAuthError> {
        let client_auth = client_auth
            .ok_or_else(|| OAuthError::InvalidClient("Missing client credentials".to_string()))?;
        if client_auth.client_secret.is_none() {
            return Err(OAuthError::InvalidClient(
                "Client credentials grant requires a secret".to_string(),
            ));
        }

        let client = self
            .authenticate_client(&client_auth, GrantType::ClientCredentials)
            .await?;
        if client.token_endpoint_auth_method == ClientAuthMethod::None {
            tracing::warn!(client_id = %client.client_id, "Public client attempted client_credentials");
            return Err(OAuthError::InvalidClient(
                "Client authentication failed".to_string(),
            ));
        }

        let granted_scope = match request.scope.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(requested) => {
                let requested = parse_scope(requested);
                if !client.allows_scope(&requested) {
                    return Err(OAuthError::InvalidScope(
                        "Requested scope exceeds the client's scopes".to_string(),
                    ));
                }
                Some(join_scopes(&requested))
            }
            None => (!client.scopes.is_empty()).then(|| client.scopes.join(" ")),
        };

        let minted = self.mint(&client.client_id, None, granted_scope.as_deref(), false)?;
        storage(
            self.settings.timeout,
            "token persistence",
            self.storage.store_token_pair(&minted.access_token, None),
        )
        .await?;

        Ok(self.response(minted))
    }

    /// Handle refresh token grant
    async fn handle_refresh_token_grant(
        &self,
        request: TokenRequest,
        client_auth: Option<ClientAuthentication>,
    ) -> Result<TokenResponse, OAuthError> {
        let presented = request
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| OAuthError::InvalidRequest("Missing refresh token".to_string()))?;

        self.issuer.verify_refresh_token(presented).map_err(|e| {
            tracing::warn!(error = ?e, "Refresh token failed verification");
            invalid_grant()
        })?;

        let record = storage(
            self.settings.timeout,
            "refresh token lookup",
            self.storage.get_refresh_token(presented),
        )
        .await?
        .ok_or_else(|| {
            tracing::warn!("Unknown refresh token");
            invalid_grant()
        })?;
        if Utc::now() >= record.expires_at {
            tracing::warn!(client_id = %record.client_id, "Refresh token expired");
            return Err(invalid_grant());
        }

        let client = match client_auth {
            Some(client_auth) => {
                let client = self
                    .authenticate_client(&client_auth, GrantType::RefreshToken)
                    .await?;
                if client.client_id != record.client_id {
                    tracing::warn!(client_id = %client.client_id, token_client_id = %record.client_id, "Refresh token issued to another client");
                    return Err(invalid_grant());
                }
                client
            }
            None => {
                let client = self.find_client(&record.client_id).await?;
                if !client.supports_grant(GrantType::RefreshToken) {
                    return Err(OAuthError::UnsupportedGrantType(
                        GrantType::RefreshToken.to_string(),
                    ));
                }
                client
            }
        };

        let minted = self.mint(
            &client.client_id,
            Some(&record.user_id),
            record.scope.as_deref(),
            true,
        )?;
        let refresh_token = minted
            .refresh_token
            .as_ref()
            .ok_or_else(|| OAuthError::ServerError("Refresh token was not minted".to_string()))?;

        let rotated = storage(
            self.settings.timeout,
            "refresh token rotation",
            self.storage
                .rotate_refresh_token(&record.token, &minted.access_token, refresh_token),
        )
        .await?;
        if !rotated {
            tracing::warn!(client_id = %client.client_id, "Refresh token already rotated");
            return Err(invalid_grant());
        }

        Ok(self.response(minted))
    }

    async fn find_client(&self, client_id: &str) -> Result<OAuthClient, OAuthError> {
        match bounded(self.settings.timeout, "client lookup", self.registry.find(client_id)).await? {
            Ok(client) => Ok(client),
            Err(ClientRegistrationError::ClientNotFound(_)) => {
                tracing::warn!(client_id, "Unknown client at token endpoint");
                Err(invalid_client())
            }
            Err(e) => {
                tracing::error!(client_id, error = ?e, "Client lookup failed");
                Err(OAuthError::ServerError("Client lookup failed".to_string()))
            }
        }
    }

    /// Look up the client, check the grant is allowed and verify the secret
    /// unless the client authenticates with `none`.
    async fn authenticate_client(
        &self,
        client_auth: &ClientAuthentication,
        grant_type: GrantType,
    ) -> Result<OAuthClient, OAuthError> {
        let client = self.find_client(&client_auth.client_id).await?;

        if !client.supports_grant(grant_type) {
            return Err(OAuthError::UnsupportedGrantType(grant_type.to_string()));
        }

        match client.token_endpoint_auth_method {
            ClientAuthMethod::None => Ok(client),
            ClientAuthMethod::ClientSecretBasic | ClientAuthMethod::ClientSecretPost => {
                let secret = client_auth.client_secret.as_deref().ok_or_else(|| {
                    tracing::warn!(client_id = %client.client_id, "Missing client secret");
                    invalid_client()
                })?;
                match bounded(
                    self.settings.timeout,
                    "secret verification",
                    self.registry.validate_secret(&client, secret),
                )
                .await?
                {
                    Ok(()) => Ok(client),
                    Err(e) => {
                        tracing::warn!(client_id = %client.client_id, error = ?e, "Client secret rejected");
                        Err(invalid_client())
                    }
                }
            }
        }
    }

    fn mint(
        &self,
        client_id: &str,
        user_id: Option<&str>,
        scope: Option<&str>,
        with_refresh: bool,
    ) -> Result<MintedTokens, OAuthError> {
        let now = Utc::now();
        let access_expires_at = now + self.settings.access_token_lifetime;
        let access = self.issuer.mint_access_token(&TokenGrant {
            client_id,
            user_id,
            scope,
            issued_at: now,
            expires_at: access_expires_at,
        })?;
        let access_token = AccessToken {
            token: access,
            client_id: client_id.to_string(),
            user_id: user_id.map(str::to_string),
            scope: scope.map(str::to_string),
            created_at: now,
            expires_at: access_expires_at,
        };

        let refresh_token = match (with_refresh, user_id) {
            (true, Some(user_id)) => Some(self.mint_refresh(&access_token, user_id, now)?),
            _ => None,
        };

        Ok(MintedTokens {
            access_token,
            refresh_token,
        })
    }

    fn mint_refresh(
        &self,
        access_token: &AccessToken,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshToken, OAuthError> {
        let expires_at = now + self.settings.refresh_token_lifetime;
        let token = self.issuer.mint_refresh_token(&TokenGrant {
            client_id: &access_token.client_id,
            user_id: Some(user_id),
            scope: access_token.scope.as_deref(),
            issued_at: now,
            expires_at,
        })?;
        Ok(RefreshToken {
            token,
            access_token: access_token.token.clone(),
            client_id: access_token.client_id.clone(),
            user_id: user_id.to_string(),
            scope: access_token.scope.clone(),
            created_at: now,
            expires_at,
        })
    }

    fn response(&self, minted: MintedTokens) -> TokenResponse {
        TokenResponse {
            expires_in: self.settings.access_token_lifetime.num_seconds().max(0) as u64,
            access_token: minted.access_token.token,
            token_type: TokenType::Bearer,
            refresh_token: minted.refresh_token.map(|r| r.token),
            scope: minted.access_token.scope,
        }
    }
}

fn invalid_grant() -> OAuthError {
    OAuthError::InvalidGrant("The provided grant is invalid".to_string())
}

fn invalid_client() -> OAuthError {
    OAuthError::InvalidClient("Client authentication failed".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::keys::KeyManager;
    use crate::storage::MemoryOAuthStorage;
    use crate::storage::traits::{
        AccessTokenStore, AuthorizationCodeStore, OAuthClientStore, RefreshTokenStore,
    };
    use axum::http::HeaderValue;

    const SECRET: &str = "acme-secret";
    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    struct Fixture {
        engine: TokenEngine,
        storage: Arc<MemoryOAuthStorage>,
        issuer: Arc<TokenIssuer>,
    }

    fn client(
        client_id: &str,
        grant_types: Vec<GrantType>,
        auth_method: ClientAuthMethod,
    ) -> OAuthClient {
        OAuthClient {
            client_id: client_id.to_string(),
            client_secret_hash: bcrypt::hash(SECRET, 4).unwrap(),
            client_name: client_id.to_string(),
            grant_types,
            response_types: vec![ResponseType::Code],
            token_endpoint_auth_method: auth_method,
            redirect_uris: vec!["https://acme.test/cb".to_string()],
            scopes: vec!["read".to_string(), "write".to_string()],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn fixture() -> Fixture {
        let storage = Arc::new(MemoryOAuthStorage::new());
        for c in [
            client(
                "acme",
                vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
                ClientAuthMethod::ClientSecretPost,
            ),
            client(
                "service",
                vec![GrantType::ClientCredentials],
                ClientAuthMethod::ClientSecretBasic,
            ),
            client(
                "public",
                vec![GrantType::AuthorizationCode, GrantType::ClientCredentials],
                ClientAuthMethod::None,
            ),
        ] {
            storage.create_client(&c).await.unwrap();
        }

        let keys = Arc::new(KeyManager::new(storage.clone()));
        keys.initialize().await.unwrap();
        let issuer = Arc::new(TokenIssuer::new(
            keys,
            "https://auth.test".to_string(),
            "0123456789abcdef0123456789abcdef",
        ));
        let engine = TokenEngine::new(
            Arc::new(ClientRegistry::new(storage.clone(), storage.clone())),
            storage.clone(),
            issuer.clone(),
            TokenSettings {
                access_token_lifetime: chrono::Duration::hours(1),
                refresh_token_lifetime: chrono::Duration::days(30),
                timeout: Duration::from_secs(5),
            },
        );
        Fixture {
            engine,
            storage,
            issuer,
        }
    }

    async fn store_code(storage: &MemoryOAuthStorage, code: &str, client_id: &str) {
        let now = Utc::now();
        storage
            .store_code(&AuthorizationCode {
                code: code.to_string(),
                client_id: client_id.to_string(),
                user_id: "u1".to_string(),
                redirect_uri: "https://acme.test/cb".to_string(),
                scope: Some("read".to_string()),
                code_challenge: Some(CHALLENGE.to_string()),
                code_challenge_method: Some(CodeChallengeMethod::S256),
                created_at: now,
                expires_at: now + chrono::Duration::minutes(10),
                used: false,
            })
            .await
            .unwrap();
    }

    fn acme_auth() -> Option<ClientAuthentication> {
        Some(ClientAuthentication {
            client_id: "acme".to_string(),
            client_secret: Some(SECRET.to_string()),
        })
    }

    fn exchange(code: &str, verifier: &str) -> TokenRequest {
        let mut request = TokenRequest::new(GrantType::AuthorizationCode);
        request.code = Some(code.to_string());
        request.redirect_uri = Some("https://acme.test/cb".to_string());
        request.code_verifier = Some(verifier.to_string());
        request
    }

    #[test]
    fn test_pkce_s256() {
        assert!(verify_pkce(VERIFIER, CHALLENGE, CodeChallengeMethod::S256));
        assert!(!verify_pkce("wrong-verifier", CHALLENGE, CodeChallengeMethod::S256));
    }

    #[test]
    fn test_extract_client_auth() {
        let mut headers = HeaderMap::new();
        let encoded = BASE64_STANDARD.encode("acme:s3:cret");
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {}", encoded)).unwrap(),
        );
        let auth = extract_client_auth(&headers, None, None).unwrap().unwrap();
        assert_eq!(auth.client_id, "acme");
        assert_eq!(auth.client_secret.as_deref(), Some("s3:cret"));

        let mut malformed = HeaderMap::new();
        let encoded = BASE64_STANDARD.encode("no-colon");
        malformed.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {}", encoded)).unwrap(),
        );
        assert!(matches!(
            extract_client_auth(&malformed, Some("acme"), Some("x")),
            Err(OAuthError::InvalidRequest(_))
        ));

        let form = extract_client_auth(&HeaderMap::new(), Some("acme"), Some("x"))
            .unwrap()
            .unwrap();
        assert_eq!(form.client_id, "acme");
        assert!(extract_client_auth(&HeaderMap::new(), None, None).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_code_exchange_is_single_use() {
        let fixture = fixture().await;
        store_code(&fixture.storage, "C", "acme").await;

        let response = fixture
            .engine
            .token(exchange("C", VERIFIER), acme_auth())
            .await
            .unwrap();
        assert_eq!(response.token_type, TokenType::Bearer);
        assert_eq!(response.expires_in, 3600);
        assert_eq!(response.scope.as_deref(), Some("read"));
        let refresh = response.refresh_token.unwrap();

        let access = fixture.storage.get_token(&response.access_token).await.unwrap().unwrap();
        assert_eq!(access.user_id.as_deref(), Some("u1"));
        let stored_refresh = fixture.storage.get_refresh_token(&refresh).await.unwrap().unwrap();
        assert_eq!(stored_refresh.access_token, response.access_token);

        assert!(matches!(
            fixture.engine.token(exchange("C", VERIFIER), acme_auth()).await,
            Err(OAuthError::InvalidGrant(_))
        ));
    }

    #[tokio::test]
    async fn test_code_exchange_checks() {
        let fixture = fixture().await;

        store_code(&fixture.storage, "wrong-verifier", "acme").await;
        assert!(matches!(
            fixture
                .engine
                .token(exchange("wrong-verifier", "not-the-verifier"), acme_auth())
                .await,
            Err(OAuthError::InvalidGrant(_))
        ));

        store_code(&fixture.storage, "no-verifier", "acme").await;
        let mut missing = exchange("no-verifier", VERIFIER);
        missing.code_verifier = None;
        assert!(matches!(
            fixture.engine.token(missing, acme_auth()).await,
            Err(OAuthError::InvalidGrant(_))
        ));

        store_code(&fixture.storage, "redirect", "acme").await;
        let mut redirect = exchange("redirect", VERIFIER);
        redirect.redirect_uri = Some("https://acme.test/other".to_string());
        assert!(matches!(
            fixture.engine.token(redirect, acme_auth()).await,
            Err(OAuthError::InvalidGrant(_))
        ));

        store_code(&fixture.storage, "secret", "acme").await;
        let bad_secret = Some(ClientAuthentication {
            client_id: "acme".to_string(),
            client_secret: Some("nope".to_string()),
        });
        assert!(matches!(
            fixture.engine.token(exchange("secret", VERIFIER), bad_secret).await,
            Err(OAuthError::InvalidClient(_))
        ));

        store_code(&fixture.storage, "other-client", "public").await;
        assert!(matches!(
            fixture.engine.token(exchange("other-client", VERIFIER), acme_auth()).await,
            Err(OAuthError::InvalidGrant(_))
        ));
    }

    #[tokio::test]
    async fn test_public_client_code_exchange_without_refresh() {
        let fixture = fixture().await;
        store_code(&fixture.storage, "pub", "public").await;

        let response = fixture
            .engine
            .token(
                exchange("pub", VERIFIER),
                Some(ClientAuthentication {
                    client_id: "public".to_string(),
                    client_secret: None,
                }),
            )
            .await
            .unwrap();
        assert!(response.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_exchange_has_one_winner() {
        let fixture = fixture().await;
        store_code(&fixture.storage, "race", "acme").await;

        let (a, b) = futures::future::join(
            fixture.engine.token(exchange("race", VERIFIER), acme_auth()),
            fixture.engine.token(exchange("race", VERIFIER), acme_auth()),
        )
        .await;
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        let loser = if a.is_ok() { b } else { a };
        assert!(matches!(loser, Err(OAuthError::InvalidGrant(_))));
    }

    #[tokio::test]
    async fn test_client_credentials() {
        let fixture = fixture().await;
        let service = Some(ClientAuthentication {
            client_id: "service".to_string(),
            client_secret: Some(SECRET.to_string()),
        });

        let mut request = TokenRequest::new(GrantType::ClientCredentials);
        request.scope = Some("write".to_string());
        let response = fixture.engine.token(request, service.clone()).await.unwrap();
        assert!(response.refresh_token.is_none());
        assert_eq!(response.scope.as_deref(), Some("write"));
        let stored = fixture.storage.get_token(&response.access_token).await.unwrap().unwrap();
        assert!(stored.user_id.is_none());

        let mut admin = TokenRequest::new(GrantType::ClientCredentials);
        admin.scope = Some("admin".to_string());
        assert!(matches!(
            fixture.engine.token(admin, service).await,
            Err(OAuthError::InvalidScope(_))
        ));

        let public = Some(ClientAuthentication {
            client_id: "public".to_string(),
            client_secret: Some(SECRET.to_string()),
        });
        assert!(matches!(
            fixture
                .engine
                .token(TokenRequest::new(GrantType::ClientCredentials), public)
                .await,
            Err(OAuthError::InvalidClient(_))
        ));

        assert!(matches!(
            fixture
                .engine
                .token(TokenRequest::new(GrantType::ClientCredentials), acme_auth())
                .await,
            Err(OAuthError::UnsupportedGrantType(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_rotation() {
        let fixture = fixture().await;
        store_code(&fixture.storage, "C", "acme").await;
        let first = fixture
            .engine
            .token(exchange("C", VERIFIER), acme_auth())
            .await
            .unwrap();
        let old_refresh = first.refresh_token.unwrap();

        let mut refresh = TokenRequest::new(GrantType::RefreshToken);
        refresh.refresh_token = Some(old_refresh.clone());
        let second = fixture.engine.token(refresh.clone(), acme_auth()).await.unwrap();
        let new_refresh = second.refresh_token.clone().unwrap();
        assert_ne!(new_refresh, old_refresh);
        assert_eq!(second.scope.as_deref(), Some("read"));

        assert!(matches!(
            fixture.engine.token(refresh, None).await,
            Err(OAuthError::InvalidGrant(_))
        ));

        let mut next = TokenRequest::new(GrantType::RefreshToken);
        next.refresh_token = Some(new_refresh);
        assert!(fixture.engine.token(next, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_code_is_invalid_grant() {
        let fixture = fixture().await;
        let now = Utc::now();
        fixture
            .storage
            .store_code(&AuthorizationCode {
                code: "stale".to_string(),
                client_id: "acme".to_string(),
                user_id: "u1".to_string(),
                redirect_uri: "https://acme.test/cb".to_string(),
                scope: Some("read".to_string()),
                code_challenge: Some(CHALLENGE.to_string()),
                code_challenge_method: Some(CodeChallengeMethod::S256),
                created_at: now - chrono::Duration::minutes(20),
                expires_at: now - chrono::Duration::minutes(10),
                used: false,
            })
            .await
            .unwrap();

        assert!(matches!(
            fixture.engine.token(exchange("stale", VERIFIER), acme_auth()).await,
            Err(OAuthError::InvalidGrant(_))
        ));
        assert!(!fixture.storage.get_code("stale").await.unwrap().unwrap().used);
    }

    /// Store a refresh token whose JWT and record expire independently
    async fn store_refresh(
        fixture: &Fixture,
        jwt_expires_at: DateTime<Utc>,
        record_expires_at: DateTime<Utc>,
    ) -> String {
        let now = Utc::now();
        let token = fixture
            .issuer
            .mint_refresh_token(&TokenGrant {
                client_id: "acme",
                user_id: Some("u1"),
                scope: Some("read"),
                issued_at: now - chrono::Duration::days(2),
                expires_at: jwt_expires_at,
            })
            .unwrap();
        let access = AccessToken {
            token: generate_token(),
            client_id: "acme".to_string(),
            user_id: Some("u1".to_string()),
            scope: Some("read".to_string()),
            created_at: now - chrono::Duration::days(2),
            expires_at: now - chrono::Duration::days(1),
        };
        fixture
            .storage
            .store_token_pair(
                &access,
                Some(&RefreshToken {
                    token: token.clone(),
                    access_token: access.token.clone(),
                    client_id: "acme".to_string(),
                    user_id: "u1".to_string(),
                    scope: Some("read".to_string()),
                    created_at: now - chrono::Duration::days(2),
                    expires_at: record_expires_at,
                }),
            )
            .await
            .unwrap();
        token
    }

    #[tokio::test]
    async fn test_expired_refresh_token_is_invalid_grant() {
        let fixture = fixture().await;
        let now = Utc::now();

        let stale_record = store_refresh(
            &fixture,
            now + chrono::Duration::days(1),
            now - chrono::Duration::hours(1),
        )
        .await;
        let stale_jwt = store_refresh(
            &fixture,
            now - chrono::Duration::hours(2),
            now + chrono::Duration::days(1),
        )
        .await;

        for token in [stale_record, stale_jwt] {
            let mut refresh = TokenRequest::new(GrantType::RefreshToken);
            refresh.refresh_token = Some(token.clone());
            assert!(matches!(
                fixture.engine.token(refresh, acme_auth()).await,
                Err(OAuthError::InvalidGrant(_))
            ));
            assert!(fixture.storage.get_refresh_token(&token).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_refresh_requires_token_and_valid_signature() {
        let fixture = fixture().await;
        assert!(matches!(
            fixture
                .engine
                .token(TokenRequest::new(GrantType::RefreshToken), None)
                .await,
            Err(OAuthError::InvalidRequest(_))
        ));

        let mut forged = TokenRequest::new(GrantType::RefreshToken);
        forged.refresh_token = Some("not.a.jwt".to_string());
        assert!(matches!(
            fixture.engine.token(forged, None).await,
            Err(OAuthError::InvalidGrant(_))
        ));
    }

    #[tokio::test]
    async fn test_unsupported_grants() {
        let fixture = fixture().await;
        assert!(matches!(
            fixture
                .engine
                .token(TokenRequest::new(GrantType::Password), acme_auth())
                .await,
            Err(OAuthError::UnsupportedGrantType(_))
        ));
        assert!(matches!(
            TokenRequest::try_from(TokenForm {
                grant_type: "urn:magic".to_string(),
                ..Default::default()
            }),
            Err(OAuthError::UnsupportedGrantType(_))
        ));
    }
}
