//! SQLite implementation for authorization code storage

use super::{database_error, get_column, get_timestamp, timestamp};
use crate::errors::StorageError;
use crate::oauth::types::*;
use crate::storage::traits::{AuthorizationCodeStore, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqliteRow};

/// SQLite implementation of authorization code storage
pub struct SqliteAuthorizationCodeStore {
    pool: SqlitePool,
}

impl SqliteAuthorizationCodeStore {
    /// Create a new SQLite authorization code store
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Convert SQLite row to AuthorizationCode
    fn row_to_authorization_code(row: &SqliteRow) -> Result<AuthorizationCode> {
        let method: Option<String> = get_column(row, "code_challenge_method")?;
        let code_challenge_method = method
            .map(|m| m.parse::<CodeChallengeMethod>())
            .transpose()
            .map_err(StorageError::InvalidData)?;
        let used: i64 = get_column(row, "used")?;

        Ok(AuthorizationCode {
            code: get_column(row, "code")?,
            client_id: get_column(row, "client_id")?,
            user_id: get_column(row, "user_id")?,
            redirect_uri: get_column(row, "redirect_uri")?,
            scope: get_column(row, "scope")?,
            code_challenge: get_column(row, "code_challenge")?,
            code_challenge_method,
            created_at: get_timestamp(row, "created_at")?,
            expires_at: get_timestamp(row, "expires_at")?,
            used: used != 0,
        })
    }
}

#[async_trait]
impl AuthorizationCodeStore for SqliteAuthorizationCodeStore {
    async fn store_code(&self, code: &AuthorizationCode) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO authorization_codes (
                code, client_id, user_id, redirect_uri, scope, code_challenge,
                code_challenge_method, created_at, expires_at, used
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&code.code)
        .bind(&code.client_id)
        .bind(&code.user_id)
        .bind(&code.redirect_uri)
        .bind(&code.scope)
        .bind(&code.code_challenge)
        .bind(code.code_challenge_method.map(|m| m.as_str()))
        .bind(timestamp(&code.created_at))
        .bind(timestamp(&code.expires_at))
        .bind(code.used as i64)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(())
    }

    async fn get_code(&self, code: &str) -> Result<Option<AuthorizationCode>> {
        let row = sqlx::query("SELECT * FROM authorization_codes WHERE code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;

        match row {
            Some(row) => Ok(Some(Self::row_to_authorization_code(&row)?)),
            None => Ok(None),
        }
    }

    async fn mark_code_used(&self, code: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE authorization_codes SET used = 1 WHERE code = ? AND used = 0")
            .bind(code)
            .execute(&self.pool)
            .await
            .map_err(database_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn cleanup_expired_codes(&self) -> Result<usize> {
        let result = sqlx::query("DELETE FROM authorization_codes WHERE expires_at < ?")
            .bind(timestamp(&Utc::now()))
            .execute(&self.pool)
            .await
            .map_err(database_error)?;

        Ok(result.rows_affected() as usize)
    }
}
