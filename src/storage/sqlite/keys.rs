//! SQLite implementation for signing key storage

use super::{database_error, get_column, timestamp};
use crate::storage::traits::{KeyPersistence, PemKeyPair, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePool;

/// SQLite implementation of signing key persistence
///
/// The table holds at most one row; saving replaces it.
pub struct SqliteKeyStore {
    pool: SqlitePool,
}

impl SqliteKeyStore {
    /// Create a new SQLite key store
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyPersistence for SqliteKeyStore {
    async fn load(&self) -> Result<Option<PemKeyPair>> {
        let row = sqlx::query("SELECT private_key_pem, public_key_pem FROM signing_keys WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;

        match row {
            Some(row) => Ok(Some(PemKeyPair {
                private_key_pem: get_column(&row, "private_key_pem")?,
                public_key_pem: get_column(&row, "public_key_pem")?,
            })),
            None => Ok(None),
        }
    }

    async fn save(&self, keys: &PemKeyPair) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO signing_keys (id, private_key_pem, public_key_pem, created_at)
            VALUES (1, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                private_key_pem = excluded.private_key_pem,
                public_key_pem = excluded.public_key_pem,
                created_at = excluded.created_at
            "#,
        )
        .bind(&keys.private_key_pem)
        .bind(&keys.public_key_pem)
        .bind(timestamp(&Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(())
    }
}
