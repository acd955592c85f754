//! SQLite implementation for OAuth client storage

use super::{database_error, get_column, get_timestamp, is_unique_violation, timestamp};
use crate::errors::StorageError;
use crate::oauth::types::*;
use crate::storage::traits::{OAuthClientStore, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};

/// SQLite implementation of OAuth client storage
pub struct SqliteOAuthClientStore {
    pool: SqlitePool,
}

impl SqliteOAuthClientStore {
    /// Create a new SQLite OAuth client store
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn to_json<T: Serialize>(value: &T) -> Result<String> {
        serde_json::to_string(value).map_err(|e| StorageError::SerializationFailed(e.to_string()))
    }

    fn from_json<T: DeserializeOwned>(row: &SqliteRow, column: &str) -> Result<T> {
        let json: String = get_column(row, column)?;
        serde_json::from_str(&json).map_err(|e| StorageError::SerializationFailed(e.to_string()))
    }

    /// Convert SQLite row to OAuthClient
    fn row_to_oauth_client(row: &SqliteRow) -> Result<OAuthClient> {
        let auth_method: String = get_column(row, "token_endpoint_auth_method")?;
        let token_endpoint_auth_method = auth_method
            .parse::<ClientAuthMethod>()
            .map_err(StorageError::InvalidData)?;

        Ok(OAuthClient {
            client_id: get_column(row, "client_id")?,
            client_secret_hash: get_column(row, "client_secret_hash")?,
            client_name: get_column(row, "client_name")?,
            grant_types: Self::from_json(row, "grant_types")?,
            response_types: Self::from_json(row, "response_types")?,
            token_endpoint_auth_method,
            redirect_uris: Self::from_json(row, "redirect_uris")?,
            scopes: Self::from_json(row, "scopes")?,
            created_at: get_timestamp(row, "created_at")?,
            updated_at: get_timestamp(row, "updated_at")?,
        })
    }
}

#[async_trait]
impl OAuthClientStore for SqliteOAuthClientStore {
    async fn create_client(&self, client: &OAuthClient) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(database_error)?;

        let existing = sqlx::query(
            "SELECT client_id FROM oauth_clients WHERE client_id = ? OR client_name = ? LIMIT 1",
        )
        .bind(&client.client_id)
        .bind(&client.client_name)
        .fetch_optional(&mut *tx)
        .await
        .map_err(database_error)?;

        if existing.is_some() {
            return Err(StorageError::AlreadyExists(format!(
                "client {} or name {}",
                client.client_id, client.client_name
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO oauth_clients (
                client_id, client_secret_hash, client_name, grant_types, response_types,
                token_endpoint_auth_method, redirect_uris, scopes, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&client.client_id)
        .bind(&client.client_secret_hash)
        .bind(&client.client_name)
        .bind(Self::to_json(&client.grant_types)?)
        .bind(Self::to_json(&client.response_types)?)
        .bind(client.token_endpoint_auth_method.as_str())
        .bind(Self::to_json(&client.redirect_uris)?)
        .bind(Self::to_json(&client.scopes)?)
        .bind(timestamp(&client.created_at))
        .bind(timestamp(&client.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::AlreadyExists(format!("client {}", client.client_id))
            } else {
                database_error(e)
            }
        })?;

        tx.commit().await.map_err(database_error)?;
        Ok(())
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<OAuthClient>> {
        let row = sqlx::query("SELECT * FROM oauth_clients WHERE client_id = ?")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;

        match row {
            Some(row) => Ok(Some(Self::row_to_oauth_client(&row)?)),
            None => Ok(None),
        }
    }

    async fn client_exists(&self, client_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM oauth_clients WHERE client_id = ?")
            .bind(client_id)
            .fetch_one(&self.pool)
            .await
            .map_err(database_error)?;

        let count: i64 = row
            .try_get("count")
            .map_err(|e| StorageError::DatabaseError(format!("Failed to get count: {}", e)))?;
        Ok(count > 0)
    }
}
