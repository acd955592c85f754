//! End-user accounts: registration, password login, consent and userinfo.

use crate::errors::{ClientRegistrationError, OAuthError, StorageError};
use crate::oauth::clients::ClientRegistry;
use crate::oauth::deadline::{bounded, storage};
use crate::oauth::jwt::TokenIssuer;
use crate::oauth::types::*;
use crate::storage::traits::{AccessTokenStore, ConsentOracle, OAuthStorage, SessionOracle, UserDirectory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Session created by a successful login
#[derive(Debug, Clone)]
pub struct LoginSession {
    pub session_id: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Claims returned by the userinfo endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Account service configuration
#[derive(Debug, Clone)]
pub struct AccountSettings {
    pub session_lifetime: chrono::Duration,
    pub timeout: Duration,
    pub bcrypt_cost: u32,
}

pub struct AccountService {
    users: Arc<dyn UserDirectory>,
    sessions: Arc<dyn SessionOracle>,
    consents: Arc<dyn ConsentOracle>,
    registry: Arc<ClientRegistry>,
    tokens: Arc<dyn OAuthStorage>,
    issuer: Arc<TokenIssuer>,
    settings: AccountSettings,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        sessions: Arc<dyn SessionOracle>,
        consents: Arc<dyn ConsentOracle>,
        registry: Arc<ClientRegistry>,
        tokens: Arc<dyn OAuthStorage>,
        issuer: Arc<TokenIssuer>,
        settings: AccountSettings,
    ) -> Self {
        Self {
            users,
            sessions,
            consents,
            registry,
            tokens,
            issuer,
            settings,
        }
    }

    /// Register a user with a bcrypt-hashed password
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<String>,
    ) -> Result<User, OAuthError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(OAuthError::InvalidRequest("A valid email is required".to_string()));
        }
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(OAuthError::InvalidRequest(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        let password = password.to_string();
        let cost = self.settings.bcrypt_cost;
        let password_hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| OAuthError::ServerError(e.to_string()))?
            .map_err(|e| {
                tracing::error!(error = ?e, "Password hashing failed");
                OAuthError::ServerError("Password hashing failed".to_string())
            })?;

        let user = User {
            id: Uuid::new_v4().to_string(),
            email,
            name: name.filter(|n| !n.trim().is_empty()),
            password_hash,
            created_at: Utc::now(),
        };

        match bounded(self.settings.timeout, "user creation", self.users.create_user(&user)).await? {
            Ok(()) => {}
            Err(StorageError::AlreadyExists(_)) => {
                return Err(OAuthError::InvalidRequest(
                    "Email is already registered".to_string(),
                ));
            }
            Err(e) => {
                tracing::error!(error = ?e, "User creation failed");
                return Err(OAuthError::ServerError("User creation failed".to_string()));
            }
        }

        tracing::info!(user_id = %user.id, "Registered user");
        Ok(user)
    }

    /// Check a password and open a session
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginSession, OAuthError> {
        let denied = || OAuthError::AccessDenied("Invalid email or password".to_string());
        let email = email.trim().to_lowercase();

        let user = storage(self.settings.timeout, "user lookup", self.users.find_by_email(&email))
            .await?
            .ok_or_else(|| {
                tracing::debug!("Login for unknown email");
                denied()
            })?;

        let hash = user.password_hash.clone();
        let password = password.to_string();
        let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| OAuthError::ServerError(e.to_string()))?
            .unwrap_or(false);
        if !verified {
            tracing::warn!(user_id = %user.id, "Login with wrong password");
            return Err(denied());
        }

        let expires_at = Utc::now() + self.settings.session_lifetime;
        let session_id = storage(
            self.settings.timeout,
            "session creation",
            self.sessions.create_session(&user.id, &user.email, expires_at),
        )
        .await?;

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(LoginSession {
            session_id,
            user_id: user.id,
            expires_at,
        })
    }

    /// Record the session user's consent to `scope` for a client
    pub async fn grant_consent(
        &self,
        session_id: Option<&str>,
        client_id: &str,
        scope: &str,
    ) -> Result<(), OAuthError> {
        let not_authenticated = || OAuthError::NotAuthenticated("Login required".to_string());
        let session_id = session_id.filter(|s| !s.is_empty()).ok_or_else(not_authenticated)?;
        let user_id = storage(self.settings.timeout, "session user lookup", self.sessions.user_id(session_id))
            .await?
            .ok_or_else(not_authenticated)?;

        let client = match bounded(self.settings.timeout, "client lookup", self.registry.find(client_id)).await? {
            Ok(client) => client,
            Err(ClientRegistrationError::ClientNotFound(_)) => {
                return Err(OAuthError::InvalidClient("Unknown client".to_string()));
            }
            Err(e) => {
                tracing::error!(client_id, error = ?e, "Client lookup failed");
                return Err(OAuthError::ServerError("Client lookup failed".to_string()));
            }
        };

        if !validate_scope(scope) || !client.allows_scope(&parse_scope(scope)) {
            return Err(OAuthError::InvalidScope(
                "Scope is not allowed for this client".to_string(),
            ));
        }

        storage(
            self.settings.timeout,
            "consent grant",
            self.consents.grant_consent(&user_id, &client.client_id, scope),
        )
        .await?;

        tracing::info!(user_id = %user_id, client_id = %client.client_id, "Consent granted");
        Ok(())
    }

    /// End a login session. Logging out without a live session is not an error.
    pub async fn logout(&self, session_id: Option<&str>) -> Result<(), OAuthError> {
        let Some(session_id) = session_id.filter(|s| !s.is_empty()) else {
            return Ok(());
        };
        let removed = storage(
            self.settings.timeout,
            "session deletion",
            self.sessions.delete_session(session_id),
        )
        .await?;
        if removed {
            tracing::info!("User logged out");
        }
        Ok(())
    }

    /// Resolve a bearer access token to the user it was issued for
    pub async fn userinfo(&self, access_token: &str) -> Result<UserInfo, OAuthError> {
        let invalid = || OAuthError::InvalidToken("Invalid access token".to_string());

        let claims = self.issuer.verify_access_token(access_token)?;
        let stored = storage(
            self.settings.timeout,
            "access token lookup",
            AccessTokenStore::get_token(self.tokens.as_ref(), access_token),
        )
        .await?
        .ok_or_else(invalid)?;
        if Utc::now() >= stored.expires_at {
            return Err(invalid());
        }

        let user_id = stored.user_id.or(claims.sub).ok_or_else(invalid)?;
        let user = storage(self.settings.timeout, "user lookup", self.users.find_by_id(&user_id))
            .await?
            .ok_or_else(invalid)?;

        Ok(UserInfo {
            sub: user.id,
            email: user.email,
            name: user.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::jwt::TokenGrant;
    use crate::oauth::keys::KeyManager;
    use crate::storage::traits::{OAuthClientStore, RefreshTokenStore};
    use crate::storage::{MemoryAccountStorage, MemoryOAuthStorage, MemorySessionStorage};

    struct Fixture {
        service: AccountService,
        accounts: Arc<MemoryAccountStorage>,
        storage: Arc<MemoryOAuthStorage>,
        issuer: Arc<TokenIssuer>,
    }

    async fn fixture() -> Fixture {
        let storage = Arc::new(MemoryOAuthStorage::new());
        let accounts = Arc::new(MemoryAccountStorage::new());
        let sessions = Arc::new(MemorySessionStorage::new());
        let now = Utc::now();
        storage
            .create_client(&OAuthClient {
                client_id: "acme".to_string(),
                client_secret_hash: "unused".to_string(),
                client_name: "Acme".to_string(),
                grant_types: vec![GrantType::AuthorizationCode],
                response_types: vec![ResponseType::Code],
                token_endpoint_auth_method: ClientAuthMethod::ClientSecretBasic,
                redirect_uris: vec!["https://acme.test/cb".to_string()],
                scopes: vec!["read".to_string()],
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        let keys = Arc::new(KeyManager::new(storage.clone()));
        keys.initialize().await.unwrap();
        let issuer = Arc::new(TokenIssuer::new(
            keys,
            "https://auth.test".to_string(),
            "0123456789abcdef0123456789abcdef",
        ));

        let service = AccountService::new(
            accounts.clone(),
            sessions,
            accounts.clone(),
            Arc::new(ClientRegistry::new(storage.clone(), storage.clone())),
            storage.clone(),
            issuer.clone(),
            AccountSettings {
                session_lifetime: chrono::Duration::hours(1),
                timeout: Duration::from_secs(5),
                bcrypt_cost: 4,
            },
        );
        Fixture {
            service,
            accounts,
            storage,
            issuer,
        }
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let fixture = fixture().await;
        let user = fixture
            .service
            .register("Alice@Example.com", "correct horse", Some("Alice".to_string()))
            .await
            .unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert_ne!(user.password_hash, "correct horse");

        assert!(matches!(
            fixture.service.register("alice@example.com", "another one", None).await,
            Err(OAuthError::InvalidRequest(_))
        ));
        assert!(matches!(
            fixture.service.register("bob@example.com", "short", None).await,
            Err(OAuthError::InvalidRequest(_))
        ));

        let session = fixture
            .service
            .login("alice@example.com", "correct horse")
            .await
            .unwrap();
        assert_eq!(session.user_id, user.id);

        assert!(matches!(
            fixture.service.login("alice@example.com", "wrong horse").await,
            Err(OAuthError::AccessDenied(_))
        ));
        assert!(matches!(
            fixture.service.login("nobody@example.com", "correct horse").await,
            Err(OAuthError::AccessDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_consent_requires_session_and_allowed_scope() {
        let fixture = fixture().await;
        let user = fixture
            .service
            .register("alice@example.com", "correct horse", None)
            .await
            .unwrap();
        let session = fixture
            .service
            .login("alice@example.com", "correct horse")
            .await
            .unwrap();

        assert!(matches!(
            fixture.service.grant_consent(None, "acme", "read").await,
            Err(OAuthError::NotAuthenticated(_))
        ));
        assert!(matches!(
            fixture
                .service
                .grant_consent(Some(&session.session_id), "acme", "admin")
                .await,
            Err(OAuthError::InvalidScope(_))
        ));

        fixture
            .service
            .grant_consent(Some(&session.session_id), "ACME", "read")
            .await
            .unwrap();
        assert!(fixture.accounts.has_consented(&user.id, "acme", "read").await.unwrap());
    }

    #[tokio::test]
    async fn test_logout_ends_session() {
        let fixture = fixture().await;
        fixture
            .service
            .register("alice@example.com", "correct horse", None)
            .await
            .unwrap();
        let session = fixture
            .service
            .login("alice@example.com", "correct horse")
            .await
            .unwrap();

        fixture.service.logout(Some(&session.session_id)).await.unwrap();
        assert!(matches!(
            fixture
                .service
                .grant_consent(Some(&session.session_id), "acme", "read")
                .await,
            Err(OAuthError::NotAuthenticated(_))
        ));

        fixture.service.logout(Some(&session.session_id)).await.unwrap();
        fixture.service.logout(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_userinfo() {
        let fixture = fixture().await;
        let user = fixture
            .service
            .register("alice@example.com", "correct horse", Some("Alice".to_string()))
            .await
            .unwrap();

        let now = Utc::now();
        let token = fixture
            .issuer
            .mint_access_token(&TokenGrant {
                client_id: "acme",
                user_id: Some(&user.id),
                scope: Some("read"),
                issued_at: now,
                expires_at: now + chrono::Duration::hours(1),
            })
            .unwrap();

        assert!(matches!(
            fixture.service.userinfo(&token).await,
            Err(OAuthError::InvalidToken(_))
        ));

        fixture
            .storage
            .store_token_pair(
                &AccessToken {
                    token: token.clone(),
                    client_id: "acme".to_string(),
                    user_id: Some(user.id.clone()),
                    scope: Some("read".to_string()),
                    created_at: now,
                    expires_at: now + chrono::Duration::hours(1),
                },
                None,
            )
            .await
            .unwrap();

        let info = fixture.service.userinfo(&token).await.unwrap();
        assert_eq!(info.sub, user.id);
        assert_eq!(info.email, "alice@example.com");
        assert_eq!(info.name.as_deref(), Some("Alice"));
    }
}
