//! SQLite implementation for access token storage

use super::{database_error, get_column, get_timestamp, timestamp};
use crate::oauth::types::*;
use crate::storage::traits::{AccessTokenStore, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Executor, Sqlite};

/// SQLite implementation of access token storage
pub struct SqliteAccessTokenStore {
    pool: SqlitePool,
}

impl SqliteAccessTokenStore {
    /// Create a new SQLite access token store
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Convert SQLite row to AccessToken
    fn row_to_access_token(row: &SqliteRow) -> Result<AccessToken> {
        Ok(AccessToken {
            token: get_column(row, "token")?,
            client_id: get_column(row, "client_id")?,
            user_id: get_column(row, "user_id")?,
            scope: get_column(row, "scope")?,
            created_at: get_timestamp(row, "created_at")?,
            expires_at: get_timestamp(row, "expires_at")?,
        })
    }
}

/// Insert an access token using any executor, so refresh token storage can
/// include it in its own transaction.
pub(crate) async fn insert_access_token<'e, E>(executor: E, token: &AccessToken) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO access_tokens (token, client_id, user_id, scope, created_at, expires_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&token.token)
    .bind(&token.client_id)
    .bind(&token.user_id)
    .bind(&token.scope)
    .bind(timestamp(&token.created_at))
    .bind(timestamp(&token.expires_at))
    .execute(executor)
    .await
    .map_err(database_error)?;

    Ok(())
}

#[async_trait]
impl AccessTokenStore for SqliteAccessTokenStore {
    async fn store_token(&self, token: &AccessToken) -> Result<()> {
        insert_access_token(&self.pool, token).await
    }

    async fn get_token(&self, token: &str) -> Result<Option<AccessToken>> {
        let row = sqlx::query("SELECT * FROM access_tokens WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;

        match row {
            Some(row) => Ok(Some(Self::row_to_access_token(&row)?)),
            None => Ok(None),
        }
    }

    async fn revoke_token(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM access_tokens WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(database_error)?;

        Ok(())
    }

    async fn cleanup_expired_tokens(&self) -> Result<usize> {
        let result = sqlx::query("DELETE FROM access_tokens WHERE expires_at < ?")
            .bind(timestamp(&Utc::now()))
            .execute(&self.pool)
            .await
            .map_err(database_error)?;

        Ok(result.rows_affected() as usize)
    }
}
