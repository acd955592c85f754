//! SQLite implementation for the scope registry

use super::{database_error, get_column, get_timestamp, is_unique_violation, timestamp};
use crate::errors::StorageError;
use crate::oauth::types::Scope;
use crate::storage::traits::{Result, ScopeStore};
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqliteRow};

pub struct SqliteScopeStore {
    pool: SqlitePool,
}

impl SqliteScopeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_scope(row: &SqliteRow) -> Result<Scope> {
        Ok(Scope {
            id: get_column(row, "id")?,
            name: get_column(row, "name")?,
            description: get_column(row, "description")?,
            created_at: get_timestamp(row, "created_at")?,
        })
    }
}

#[async_trait]
impl ScopeStore for SqliteScopeStore {
    async fn create_scope(&self, scope: &Scope) -> Result<()> {
        sqlx::query("INSERT INTO scopes (id, name, description, created_at) VALUES (?, ?, ?, ?)")
            .bind(&scope.id)
            .bind(&scope.name)
            .bind(&scope.description)
            .bind(timestamp(&scope.created_at))
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StorageError::AlreadyExists(format!("scope {}", scope.name))
                } else {
                    database_error(e)
                }
            })?;

        Ok(())
    }

    async fn find_scopes(&self, names: &[String]) -> Result<Vec<Scope>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; names.len()].join(", ");
        let sql = format!(
            "SELECT * FROM scopes WHERE name IN ({}) ORDER BY name",
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for name in names {
            query = query.bind(name);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(database_error)?;
        rows.iter().map(Self::row_to_scope).collect()
    }
}
