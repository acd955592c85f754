//! In-memory user directory and consent storage.

use crate::errors::StorageError;
use crate::oauth::types::{User, UserConsent, consent_scopes, parse_scope};
use crate::storage::traits::{ConsentOracle, Result, UserDirectory};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory users and consents
#[derive(Default)]
pub struct MemoryAccountStorage {
    users: Mutex<HashMap<String, User>>,
    consents: Mutex<Vec<UserConsent>>,
}

impl MemoryAccountStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for MemoryAccountStorage {
    async fn create_user(&self, user: &User) -> Result<()> {
        let mut users = self
            .users
            .lock()
            .map_err(|e| StorageError::SerializationFailed(format!("Lock error: {}", e)))?;
        if users.values().any(|existing| existing.email == user.email) {
            return Err(StorageError::AlreadyExists(format!("user {}", user.email)));
        }
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>> {
        let users = self
            .users
            .lock()
            .map_err(|e| StorageError::SerializationFailed(format!("Lock error: {}", e)))?;
        Ok(users.get(user_id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self
            .users
            .lock()
            .map_err(|e| StorageError::SerializationFailed(format!("Lock error: {}", e)))?;
        Ok(users.values().find(|user| user.email == email).cloned())
    }
}

#[async_trait]
impl ConsentOracle for MemoryAccountStorage {
    async fn has_consented(&self, user_id: &str, client_id: &str, scope: &str) -> Result<bool> {
        let consents = self
            .consents
            .lock()
            .map_err(|e| StorageError::SerializationFailed(format!("Lock error: {}", e)))?;
        let granted = consents
            .iter()
            .filter(|c| c.user_id == user_id && c.client_id == client_id);

        let requested = parse_scope(scope);
        if requested.is_empty() {
            return Ok(granted.count() > 0);
        }
        let granted: Vec<&str> = granted.map(|c| c.scope.as_str()).collect();
        Ok(requested.iter().all(|s| granted.contains(&s.as_str())))
    }

    async fn grant_consent(&self, user_id: &str, client_id: &str, scope: &str) -> Result<()> {
        let mut consents = self
            .consents
            .lock()
            .map_err(|e| StorageError::SerializationFailed(format!("Lock error: {}", e)))?;
        let now = Utc::now();
        for name in consent_scopes(scope) {
            let exists = consents
                .iter()
                .any(|c| c.user_id == user_id && c.client_id == client_id && c.scope == name);
            if !exists {
                consents.push(UserConsent {
                    user_id: user_id.to_string(),
                    client_id: client_id.to_string(),
                    scope: name,
                    created_at: now,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, email: &str) -> User {
        User {
            id: id.to_string(),
            email: email.to_string(),
            name: None,
            password_hash: "hash".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_user_email_is_unique() {
        let storage = MemoryAccountStorage::new();
        storage.create_user(&user("u1", "a@example.com")).await.unwrap();
        let duplicate = storage.create_user(&user("u2", "a@example.com")).await;
        assert!(matches!(duplicate, Err(StorageError::AlreadyExists(_))));

        let found = storage.find_by_email("a@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, "u1");
        assert!(storage.find_by_id("u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_consent_covers_every_requested_scope() {
        let storage = MemoryAccountStorage::new();
        storage.grant_consent("u1", "acme", "read").await.unwrap();

        assert!(storage.has_consented("u1", "acme", "read").await.unwrap());
        assert!(!storage.has_consented("u1", "acme", "read write").await.unwrap());
        assert!(!storage.has_consented("u1", "other", "read").await.unwrap());
        assert!(storage.has_consented("u1", "acme", "").await.unwrap());
        assert!(!storage.has_consented("u2", "acme", "").await.unwrap());

        storage.grant_consent("u1", "acme", "write read").await.unwrap();
        assert!(storage.has_consented("u1", "acme", "read write").await.unwrap());
    }

    #[tokio::test]
    async fn test_scopeless_consent_is_recorded() {
        let storage = MemoryAccountStorage::new();
        assert!(!storage.has_consented("u1", "acme", "").await.unwrap());

        storage.grant_consent("u1", "acme", "").await.unwrap();
        storage.grant_consent("u1", "acme", "").await.unwrap();
        assert!(storage.has_consented("u1", "acme", "").await.unwrap());
        assert!(!storage.has_consented("u1", "acme", "read").await.unwrap());
        assert_eq!(storage.consents.lock().unwrap().len(), 1);
    }
}
