//! SQLite implementation for users and consents

use super::{database_error, get_column, get_timestamp, is_unique_violation, timestamp};
use crate::errors::StorageError;
use crate::oauth::types::{User, consent_scopes, parse_scope};
use crate::storage::traits::{ConsentOracle, Result, UserDirectory};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};

/// SQLite user directory and consent records
pub struct SqliteAccountStore {
    pool: SqlitePool,
}

impl SqliteAccountStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_user(row: &SqliteRow) -> Result<User> {
        Ok(User {
            id: get_column(row, "id")?,
            email: get_column(row, "email")?,
            name: get_column(row, "name")?,
            password_hash: get_column(row, "password_hash")?,
            created_at: get_timestamp(row, "created_at")?,
        })
    }

    async fn find_user(&self, column: &str, value: &str) -> Result<Option<User>> {
        let sql = format!("SELECT * FROM users WHERE {} = ?", column);
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;

        match row {
            Some(row) => Ok(Some(Self::row_to_user(&row)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl UserDirectory for SqliteAccountStore {
    async fn create_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, email, name, password_hash, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(timestamp(&user.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::AlreadyExists(format!("user {}", user.email))
            } else {
                database_error(e)
            }
        })?;

        Ok(())
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>> {
        self.find_user("id", user_id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_user("email", email).await
    }
}

#[async_trait]
impl ConsentOracle for SqliteAccountStore {
    async fn has_consented(&self, user_id: &str, client_id: &str, scope: &str) -> Result<bool> {
        let rows = sqlx::query("SELECT scope FROM user_consents WHERE user_id = ? AND client_id = ?")
            .bind(user_id)
            .bind(client_id)
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;

        let requested = parse_scope(scope);
        if requested.is_empty() {
            return Ok(!rows.is_empty());
        }

        let granted = rows
            .iter()
            .map(|row| row.try_get::<String, _>("scope"))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| StorageError::DatabaseError(format!("Failed to get scope: {}", e)))?;
        Ok(requested.iter().all(|s| granted.contains(s)))
    }

    async fn grant_consent(&self, user_id: &str, client_id: &str, scope: &str) -> Result<()> {
        let now = timestamp(&Utc::now());
        let mut tx = self.pool.begin().await.map_err(database_error)?;

        for name in consent_scopes(scope) {
            sqlx::query(
                r#"
                INSERT INTO user_consents (user_id, client_id, scope, created_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(user_id, client_id, scope) DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(client_id)
            .bind(name)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(database_error)?;
        }

        tx.commit().await.map_err(database_error)?;
        Ok(())
    }
}
