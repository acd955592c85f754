//! In-memory session storage implementation
//!
//! Sessions are stored with their expiry and treated as absent once it passes.

use crate::errors::StorageError;
use crate::storage::traits::{Result, SessionOracle};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Clone)]
struct SessionEntry {
    user_id: String,
    expires_at: DateTime<Utc>,
}

/// In-memory session store (for testing/development)
#[derive(Default)]
pub struct MemorySessionStorage {
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl MemorySessionStorage {
    /// Create a new memory session storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session under a caller-chosen identifier
    pub fn insert_session(
        &self,
        session_id: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut sessions = self.sessions.lock().map_err(|e| {
            StorageError::SerializationFailed(format!("Failed to acquire session lock: {}", e))
        })?;
        sessions.insert(
            session_id.to_string(),
            SessionEntry {
                user_id: user_id.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    fn live_entry(&self, session_id: &str) -> Result<Option<SessionEntry>> {
        let mut sessions = self.sessions.lock().map_err(|e| {
            StorageError::SerializationFailed(format!("Failed to acquire session lock: {}", e))
        })?;

        match sessions.get(session_id) {
            Some(entry) if entry.expires_at > Utc::now() => Ok(Some(entry.clone())),
            Some(_) => {
                sessions.remove(session_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SessionOracle for MemorySessionStorage {
    async fn create_session(
        &self,
        user_id: &str,
        _email: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String> {
        let session_id = Uuid::new_v4().to_string();
        self.insert_session(&session_id, user_id, expires_at)?;
        Ok(session_id)
    }

    async fn exists(&self, session_id: &str) -> Result<bool> {
        if session_id.is_empty() {
            return Ok(false);
        }
        Ok(self.live_entry(session_id)?.is_some())
    }

    async fn user_id(&self, session_id: &str) -> Result<Option<String>> {
        Ok(self.live_entry(session_id)?.map(|entry| entry.user_id))
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let mut sessions = self.sessions.lock().map_err(|e| {
            StorageError::SerializationFailed(format!("Failed to acquire session lock: {}", e))
        })?;
        Ok(sessions.remove(session_id).is_some())
    }
}
