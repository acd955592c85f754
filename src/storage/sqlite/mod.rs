//! SQLite storage implementations
//!
//! This module provides SQLite-based implementations of the storage traits.
//! SQLite is suitable for single-instance deployments and development.

mod access_tokens;
mod accounts;
mod authorization_codes;
mod keys;
mod oauth_clients;
mod refresh_tokens;
mod scopes;

use crate::errors::StorageError;
use crate::oauth::types::*;
use crate::storage::traits::*;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use std::sync::Arc;

pub use access_tokens::SqliteAccessTokenStore;
pub use accounts::SqliteAccountStore;
pub use authorization_codes::SqliteAuthorizationCodeStore;
pub use keys::SqliteKeyStore;
pub use oauth_clients::SqliteOAuthClientStore;
pub use refresh_tokens::SqliteRefreshTokenStore;
pub use scopes::SqliteScopeStore;

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text.
pub(crate) fn timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn get_timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let value: String = row
        .try_get(column)
        .map_err(|e| StorageError::DatabaseError(format!("Failed to get {}: {}", column, e)))?;
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidData(format!("Invalid {} timestamp: {}", column, e)))
}

pub(crate) fn get_column<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column)
        .map_err(|e| StorageError::DatabaseError(format!("Failed to get {}: {}", column, e)))
}

pub(crate) fn database_error(e: sqlx::Error) -> StorageError {
    StorageError::DatabaseError(e.to_string())
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

/// Comprehensive SQLite OAuth storage implementation
pub struct SqliteOAuthStorage {
    pool: SqlitePool,
    client_store: Arc<SqliteOAuthClientStore>,
    authorization_code_store: Arc<SqliteAuthorizationCodeStore>,
    access_token_store: Arc<SqliteAccessTokenStore>,
    refresh_token_store: Arc<SqliteRefreshTokenStore>,
    key_store: Arc<SqliteKeyStore>,
    scope_store: Arc<SqliteScopeStore>,
    account_store: Arc<SqliteAccountStore>,
}

impl SqliteOAuthStorage {
    /// Create a new SQLite OAuth storage instance
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            client_store: Arc::new(SqliteOAuthClientStore::new(pool.clone())),
            authorization_code_store: Arc::new(SqliteAuthorizationCodeStore::new(pool.clone())),
            access_token_store: Arc::new(SqliteAccessTokenStore::new(pool.clone())),
            refresh_token_store: Arc::new(SqliteRefreshTokenStore::new(pool.clone())),
            key_store: Arc::new(SqliteKeyStore::new(pool.clone())),
            scope_store: Arc::new(SqliteScopeStore::new(pool.clone())),
            account_store: Arc::new(SqliteAccountStore::new(pool.clone())),
            pool,
        }
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations/sqlite")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::DatabaseError(format!("Migration failed: {}", e)))?;
        Ok(())
    }

    /// Users and consents share the pool
    pub fn account_store(&self) -> Arc<SqliteAccountStore> {
        self.account_store.clone()
    }
}

#[async_trait]
impl OAuthClientStore for SqliteOAuthStorage {
    async fn create_client(&self, client: &OAuthClient) -> Result<()> {
        self.client_store.create_client(client).await
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<OAuthClient>> {
        self.client_store.get_client(client_id).await
    }

    async fn client_exists(&self, client_id: &str) -> Result<bool> {
        self.client_store.client_exists(client_id).await
    }
}

#[async_trait]
impl AuthorizationCodeStore for SqliteOAuthStorage {
    async fn store_code(&self, code: &AuthorizationCode) -> Result<()> {
        self.authorization_code_store.store_code(code).await
    }

    async fn get_code(&self, code: &str) -> Result<Option<AuthorizationCode>> {
        self.authorization_code_store.get_code(code).await
    }

    async fn mark_code_used(&self, code: &str) -> Result<bool> {
        self.authorization_code_store.mark_code_used(code).await
    }

    async fn cleanup_expired_codes(&self) -> Result<usize> {
        self.authorization_code_store.cleanup_expired_codes().await
    }
}

#[async_trait]
impl AccessTokenStore for SqliteOAuthStorage {
    async fn store_token(&self, token: &AccessToken) -> Result<()> {
        self.access_token_store.store_token(token).await
    }

    async fn get_token(&self, token: &str) -> Result<Option<AccessToken>> {
        self.access_token_store.get_token(token).await
    }

    async fn revoke_token(&self, token: &str) -> Result<()> {
        self.access_token_store.revoke_token(token).await
    }

    async fn cleanup_expired_tokens(&self) -> Result<usize> {
        self.access_token_store.cleanup_expired_tokens().await
    }
}

#[async_trait]
impl RefreshTokenStore for SqliteOAuthStorage {
    async fn store_token_pair(
        &self,
        access_token: &AccessToken,
        refresh_token: Option<&RefreshToken>,
    ) -> Result<()> {
        self.refresh_token_store
            .store_token_pair(access_token, refresh_token)
            .await
    }

    async fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>> {
        self.refresh_token_store.get_refresh_token(token).await
    }

    async fn rotate_refresh_token(
        &self,
        old_token: &str,
        access_token: &AccessToken,
        refresh_token: &RefreshToken,
    ) -> Result<bool> {
        self.refresh_token_store
            .rotate_refresh_token(old_token, access_token, refresh_token)
            .await
    }

    async fn revoke_refresh_token(&self, token: &str) -> Result<()> {
        self.refresh_token_store.revoke_refresh_token(token).await
    }

    async fn revoke_refresh_tokens_for_access_token(&self, access_token: &str) -> Result<usize> {
        self.refresh_token_store
            .revoke_refresh_tokens_for_access_token(access_token)
            .await
    }

    async fn cleanup_expired_refresh_tokens(&self) -> Result<usize> {
        self.refresh_token_store
            .cleanup_expired_refresh_tokens()
            .await
    }
}

#[async_trait]
impl ScopeStore for SqliteOAuthStorage {
    async fn create_scope(&self, scope: &Scope) -> Result<()> {
        self.scope_store.create_scope(scope).await
    }

    async fn find_scopes(&self, names: &[String]) -> Result<Vec<Scope>> {
        self.scope_store.find_scopes(names).await
    }
}

#[async_trait]
impl KeyPersistence for SqliteOAuthStorage {
    async fn load(&self) -> Result<Option<PemKeyPair>> {
        self.key_store.load().await
    }

    async fn save(&self, keys: &PemKeyPair) -> Result<()> {
        self.key_store.save(keys).await
    }
}
