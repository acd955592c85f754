//! Storage trait definitions for clients, credentials, keys, users, sessions,
//! consents and scopes.
//!
//! These are the collaborator contracts the engines call. Every backend
//! (memory, SQLite, Redis, files) implements some subset of them.

use crate::errors::StorageError;
use crate::oauth::types::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub type Result<T> = std::result::Result<T, StorageError>;

/// Trait for storing and retrieving OAuth clients
#[async_trait]
pub trait OAuthClientStore: Send + Sync {
    /// Insert a client.
    ///
    /// Re-checks id and name uniqueness and inserts inside one transaction;
    /// fails with [`StorageError::AlreadyExists`] when either is taken.
    async fn create_client(&self, client: &OAuthClient) -> Result<()>;

    /// Retrieve a client by ID, ignoring ASCII case
    async fn get_client(&self, client_id: &str) -> Result<Option<OAuthClient>>;

    /// Whether a client with the given ID exists, ignoring ASCII case
    async fn client_exists(&self, client_id: &str) -> Result<bool>;
}

/// Trait for storing and retrieving authorization codes
#[async_trait]
pub trait AuthorizationCodeStore: Send + Sync {
    /// Store a new authorization code
    async fn store_code(&self, code: &AuthorizationCode) -> Result<()>;

    /// Retrieve an authorization code without consuming it
    async fn get_code(&self, code: &str) -> Result<Option<AuthorizationCode>>;

    /// Atomically flip `used` from false to true.
    ///
    /// Returns `true` for exactly one caller per code; every other caller,
    /// including concurrent ones, gets `false`.
    async fn mark_code_used(&self, code: &str) -> Result<bool>;

    /// Clean up expired codes
    async fn cleanup_expired_codes(&self) -> Result<usize>;
}

/// Trait for storing and retrieving access tokens
#[async_trait]
pub trait AccessTokenStore: Send + Sync {
    /// Store a new access token
    async fn store_token(&self, token: &AccessToken) -> Result<()>;

    /// Retrieve an access token, expired or not
    async fn get_token(&self, token: &str) -> Result<Option<AccessToken>>;

    /// Delete a token. Deleting a missing token is not an error.
    async fn revoke_token(&self, token: &str) -> Result<()>;

    /// Clean up expired tokens
    async fn cleanup_expired_tokens(&self) -> Result<usize>;
}

/// Trait for storing and retrieving refresh tokens
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Store an access token and, optionally, the refresh token issued with it
    /// in a single transaction.
    async fn store_token_pair(
        &self,
        access_token: &AccessToken,
        refresh_token: Option<&RefreshToken>,
    ) -> Result<()>;

    /// Retrieve a refresh token, expired or not
    async fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>>;

    /// Replace `old_token` with a new access and refresh token pair.
    ///
    /// Deletes the old refresh token and inserts the new pair in one
    /// transaction. Returns `false` without writing anything when the old
    /// token is already gone, so concurrent rotations have a single winner.
    async fn rotate_refresh_token(
        &self,
        old_token: &str,
        access_token: &AccessToken,
        refresh_token: &RefreshToken,
    ) -> Result<bool>;

    /// Delete a refresh token. Deleting a missing token is not an error.
    async fn revoke_refresh_token(&self, token: &str) -> Result<()>;

    /// Delete every refresh token issued alongside the given access token
    async fn revoke_refresh_tokens_for_access_token(&self, access_token: &str) -> Result<usize>;

    /// Cleanup expired refresh tokens
    async fn cleanup_expired_refresh_tokens(&self) -> Result<usize>;
}

/// Combined credential and client storage used by the engines
pub trait OAuthStorage:
    OAuthClientStore + AuthorizationCodeStore + AccessTokenStore + RefreshTokenStore
{
}

impl<T> OAuthStorage for T where
    T: OAuthClientStore + AuthorizationCodeStore + AccessTokenStore + RefreshTokenStore
{
}

/// PEM encoded signing key pair as persisted
#[derive(Clone)]
pub struct PemKeyPair {
    pub private_key_pem: String,
    pub public_key_pem: String,
}

/// Persistence for the signing key pair
#[async_trait]
pub trait KeyPersistence: Send + Sync {
    /// Load the persisted key pair, `None` when nothing has been saved yet
    async fn load(&self) -> Result<Option<PemKeyPair>>;

    /// Persist a key pair, replacing any previous one
    async fn save(&self, keys: &PemKeyPair) -> Result<()>;
}

/// End-user session lookups backed by a TTL key-value store.
///
/// Absence is a normal `false`/`None`, never an error.
#[async_trait]
pub trait SessionOracle: Send + Sync {
    /// Create a session for a user and return its identifier
    async fn create_session(
        &self,
        user_id: &str,
        email: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String>;

    /// Whether the session exists and has not expired
    async fn exists(&self, session_id: &str) -> Result<bool>;

    /// User that owns the session
    async fn user_id(&self, session_id: &str) -> Result<Option<String>>;

    /// Remove a session; returns whether one was present
    async fn delete_session(&self, session_id: &str) -> Result<bool>;
}

/// Consent lookups
#[async_trait]
pub trait ConsentOracle: Send + Sync {
    /// Whether the user consented to every scope in `scope` for the client
    async fn has_consented(&self, user_id: &str, client_id: &str, scope: &str) -> Result<bool>;

    /// Record consent for each scope in `scope`
    async fn grant_consent(&self, user_id: &str, client_id: &str, scope: &str) -> Result<()>;
}

/// User directory
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Insert a user; fails with [`StorageError::AlreadyExists`] for a taken email
    async fn create_user(&self, user: &User) -> Result<()>;

    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
}

/// Scope registry
#[async_trait]
pub trait ScopeStore: Send + Sync {
    /// Insert a scope; fails with [`StorageError::AlreadyExists`] for a taken name
    async fn create_scope(&self, scope: &Scope) -> Result<()>;

    /// Scopes whose names are in `names`; unknown names are skipped
    async fn find_scopes(&self, names: &[String]) -> Result<Vec<Scope>>;
}
