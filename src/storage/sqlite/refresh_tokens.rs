//! SQLite implementation for refresh token storage

use super::access_tokens::insert_access_token;
use super::{database_error, get_column, get_timestamp, timestamp};
use crate::oauth::types::*;
use crate::storage::traits::{RefreshTokenStore, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Executor, Sqlite};

/// SQLite implementation of refresh token storage
pub struct SqliteRefreshTokenStore {
    pool: SqlitePool,
}

impl SqliteRefreshTokenStore {
    /// Create a new SQLite refresh token store
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Convert SQLite row to RefreshToken
    fn row_to_refresh_token(row: &SqliteRow) -> Result<RefreshToken> {
        Ok(RefreshToken {
            token: get_column(row, "token")?,
            access_token: get_column(row, "access_token")?,
            client_id: get_column(row, "client_id")?,
            user_id: get_column(row, "user_id")?,
            scope: get_column(row, "scope")?,
            created_at: get_timestamp(row, "created_at")?,
            expires_at: get_timestamp(row, "expires_at")?,
        })
    }
}

async fn insert_refresh_token<'e, E>(executor: E, token: &RefreshToken) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (
            token, access_token, client_id, user_id, scope, created_at, expires_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&token.token)
    .bind(&token.access_token)
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
impl RefreshTokenStore for SqliteRefreshTokenStore {
    async fn store_token_pair(
        &self,
        access_token: &AccessToken,
        refresh_token: Option<&RefreshToken>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(database_error)?;

        insert_access_token(&mut *tx, access_token).await?;
        if let Some(refresh_token) = refresh_token {
            insert_refresh_token(&mut *tx, refresh_token).await?;
        }

        tx.commit().await.map_err(database_error)?;
        Ok(())
    }

    async fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>> {
        let row = sqlx::query("SELECT * FROM refresh_tokens WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;

        match row {
            Some(row) => Ok(Some(Self::row_to_refresh_token(&row)?)),
            None => Ok(None),
        }
    }

    async fn rotate_refresh_token(
        &self,
        old_token: &str,
        access_token: &AccessToken,
        refresh_token: &RefreshToken,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(database_error)?;

        let deleted = sqlx::query("DELETE FROM refresh_tokens WHERE token = ?")
            .bind(old_token)
            .execute(&mut *tx)
            .await
            .map_err(database_error)?;

        if deleted.rows_affected() != 1 {
            tx.rollback().await.map_err(database_error)?;
            return Ok(false);
        }

        insert_access_token(&mut *tx, access_token).await?;
        insert_refresh_token(&mut *tx, refresh_token).await?;

        tx.commit().await.map_err(database_error)?;
        Ok(true)
    }

    async fn revoke_refresh_token(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM refresh_tokens WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(database_error)?;

        Ok(())
    }

    async fn revoke_refresh_tokens_for_access_token(&self, access_token: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE access_token = ?")
            .bind(access_token)
            .execute(&self.pool)
            .await
            .map_err(database_error)?;

        Ok(result.rows_affected() as usize)
    }

    async fn cleanup_expired_refresh_tokens(&self) -> Result<usize> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < ?")
            .bind(timestamp(&Utc::now()))
            .execute(&self.pool)
            .await
            .map_err(database_error)?;

        Ok(result.rows_affected() as usize)
    }
}
