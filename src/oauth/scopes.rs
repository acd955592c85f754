//! Scope registry service.

use crate::errors::{OAuthError, StorageError};
use crate::oauth::deadline::{bounded, storage};
use crate::oauth::types::{Scope, validate_scope};
use crate::storage::traits::ScopeStore;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateScopeRequest {
    pub name: String,
    pub description: Option<String>,
}

pub struct ScopeService {
    store: Arc<dyn ScopeStore>,
    timeout: Duration,
}

impl ScopeService {
    pub fn new(store: Arc<dyn ScopeStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Register a scope. Names are a single scope token and unique.
    pub async fn create_scope(&self, request: CreateScopeRequest) -> Result<Scope, OAuthError> {
        let name = request.name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) || !validate_scope(name) {
            return Err(OAuthError::InvalidScope(format!("Invalid scope name: {}", name)));
        }

        let scope = Scope {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: request.description.filter(|d| !d.trim().is_empty()),
            created_at: Utc::now(),
        };

        match bounded(self.timeout, "scope creation", self.store.create_scope(&scope)).await? {
            Ok(()) => {
                tracing::info!(scope = %scope.name, "Registered scope");
                Ok(scope)
            }
            Err(StorageError::AlreadyExists(_)) => Err(OAuthError::InvalidRequest(format!(
                "Scope {} already exists",
                scope.name
            ))),
            Err(e) => {
                tracing::error!(error = ?e, "Scope creation failed");
                Err(OAuthError::ServerError("Scope creation failed".to_string()))
            }
        }
    }

    /// Registered scopes among `names`
    pub async fn find_scopes(&self, names: &[String]) -> Result<Vec<Scope>, OAuthError> {
        storage(self.timeout, "scope lookup", self.store.find_scopes(names)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryOAuthStorage;

    fn service() -> ScopeService {
        ScopeService::new(Arc::new(MemoryOAuthStorage::new()), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let service = service();
        service
            .create_scope(CreateScopeRequest {
                name: "read".to_string(),
                description: Some("Read access".to_string()),
            })
            .await
            .unwrap();

        assert!(matches!(
            service
                .create_scope(CreateScopeRequest {
                    name: "read".to_string(),
                    description: None,
                })
                .await,
            Err(OAuthError::InvalidRequest(_))
        ));

        let found = service
            .find_scopes(&["read".to_string(), "write".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].description.as_deref(), Some("Read access"));
    }

    #[tokio::test]
    async fn test_rejects_bad_names() {
        let service = service();
        for name in ["", "read write", "read/all"] {
            assert!(matches!(
                service
                    .create_scope(CreateScopeRequest {
                        name: name.to_string(),
                        description: None,
                    })
                    .await,
                Err(OAuthError::InvalidScope(_))
            ));
        }
    }
}
