//! Redis-backed session storage.
//!
//! Each session is a hash (`user_id`, `email`) stored under its session id
//! with a TTL, so Redis expires sessions on its own.

use crate::errors::StorageError;
use crate::storage::traits::{Result, SessionOracle};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;
use uuid::Uuid;

/// Session storage backed by a pooled Redis connection
#[derive(Clone)]
pub struct RedisSessionStorage {
    pool: Pool,
    key_prefix: String,
}

impl RedisSessionStorage {
    /// Create a connection pool for the given Redis URL
    pub fn new(redis_url: &str) -> Result<Self> {
        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StorageError::ConnectionFailed(format!("Redis pool failed: {}", e)))?;
        Ok(Self::with_pool(pool))
    }

    pub fn with_pool(pool: Pool) -> Self {
        Self {
            pool,
            key_prefix: "session:".to_string(),
        }
    }

    fn key(&self, session_id: &str) -> String {
        format!("{}{}", self.key_prefix, session_id)
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| StorageError::ConnectionFailed(format!("Redis connection failed: {}", e)))
    }
}

#[async_trait]
impl SessionOracle for RedisSessionStorage {
    async fn create_session(
        &self,
        user_id: &str,
        email: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String> {
        let ttl = (expires_at - Utc::now()).num_seconds();
        if ttl <= 0 {
            return Err(StorageError::InvalidData(
                "session expiry is in the past".to_string(),
            ));
        }

        let session_id = Uuid::new_v4().to_string();
        let key = self.key(&session_id);
        let mut conn = self.connection().await?;

        redis::pipe()
            .atomic()
            .hset_multiple(&key, &[("user_id", user_id), ("email", email)])
            .ignore()
            .expire(&key, ttl)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("Redis session write failed: {}", e)))?;

        Ok(session_id)
    }

    async fn exists(&self, session_id: &str) -> Result<bool> {
        if session_id.is_empty() {
            return Ok(false);
        }
        let mut conn = self.connection().await?;
        conn.exists::<_, bool>(self.key(session_id))
            .await
            .map_err(|e| StorageError::QueryFailed(format!("Redis EXISTS failed: {}", e)))
    }

    async fn user_id(&self, session_id: &str) -> Result<Option<String>> {
        if session_id.is_empty() {
            return Ok(None);
        }
        let mut conn = self.connection().await?;
        conn.hget::<_, _, Option<String>>(self.key(session_id), "user_id")
            .await
            .map_err(|e| StorageError::QueryFailed(format!("Redis HGET failed: {}", e)))
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool> {
        if session_id.is_empty() {
            return Ok(false);
        }
        let mut conn = self.connection().await?;
        let removed: usize = conn
            .del(self.key(session_id))
            .await
            .map_err(|e| StorageError::QueryFailed(format!("Redis DEL failed: {}", e)))?;
        Ok(removed > 0)
    }
}
