//! In-memory OAuth storage implementation
//!
//! Clients, codes, tokens, scopes and the signing key pair kept in process
//! memory. Every multi-step operation runs under a single lock so it behaves
//! like a database transaction.

use crate::errors::StorageError;
use crate::oauth::types::*;
use crate::storage::traits::*;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Refresh tokens and access tokens share one lock so that rotation and pair
/// issuance are atomic.
#[derive(Default)]
struct TokenTables {
    access_tokens: HashMap<String, AccessToken>,
    refresh_tokens: HashMap<String, RefreshToken>,
}

/// In-memory implementation for OAuth storage
#[derive(Default)]
pub struct MemoryOAuthStorage {
    /// Keyed by lowercased client id
    clients: Mutex<HashMap<String, OAuthClient>>,
    auth_codes: Mutex<HashMap<String, AuthorizationCode>>,
    tokens: Mutex<TokenTables>,
    scopes: Mutex<HashMap<String, Scope>>,
    signing_keys: Mutex<Option<PemKeyPair>>,
}

impl MemoryOAuthStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| StorageError::SerializationFailed(format!("Lock error: {}", e)))
}

#[async_trait]
impl OAuthClientStore for MemoryOAuthStorage {
    async fn create_client(&self, client: &OAuthClient) -> Result<()> {
        let mut clients = lock(&self.clients)?;
        let key = client.client_id.to_lowercase();
        if clients.contains_key(&key) {
            return Err(StorageError::AlreadyExists(format!(
                "client id {}",
                client.client_id
            )));
        }
        if clients
            .values()
            .any(|existing| existing.client_name == client.client_name)
        {
            return Err(StorageError::AlreadyExists(format!(
                "client name {}",
                client.client_name
            )));
        }
        clients.insert(key, client.clone());
        Ok(())
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<OAuthClient>> {
        let clients = lock(&self.clients)?;
        Ok(clients.get(&client_id.to_lowercase()).cloned())
    }

    async fn client_exists(&self, client_id: &str) -> Result<bool> {
        let clients = lock(&self.clients)?;
        Ok(clients.contains_key(&client_id.to_lowercase()))
    }
}

#[async_trait]
impl AuthorizationCodeStore for MemoryOAuthStorage {
    async fn store_code(&self, code: &AuthorizationCode) -> Result<()> {
        let mut codes = lock(&self.auth_codes)?;
        codes.insert(code.code.clone(), code.clone());
        Ok(())
    }

    async fn get_code(&self, code: &str) -> Result<Option<AuthorizationCode>> {
        let codes = lock(&self.auth_codes)?;
        Ok(codes.get(code).cloned())
    }

    async fn mark_code_used(&self, code: &str) -> Result<bool> {
        let mut codes = lock(&self.auth_codes)?;
        match codes.get_mut(code) {
            Some(auth_code) if !auth_code.used => {
                auth_code.used = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cleanup_expired_codes(&self) -> Result<usize> {
        let mut codes = lock(&self.auth_codes)?;
        let now = Utc::now();
        let initial_count = codes.len();
        codes.retain(|_, code| code.expires_at > now);
        Ok(initial_count - codes.len())
    }
}

#[async_trait]
impl AccessTokenStore for MemoryOAuthStorage {
    async fn store_token(&self, token: &AccessToken) -> Result<()> {
        let mut tables = lock(&self.tokens)?;
        tables
            .access_tokens
            .insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn get_token(&self, token: &str) -> Result<Option<AccessToken>> {
        let tables = lock(&self.tokens)?;
        Ok(tables.access_tokens.get(token).cloned())
    }

    async fn revoke_token(&self, token: &str) -> Result<()> {
        let mut tables = lock(&self.tokens)?;
        tables.access_tokens.remove(token);
        Ok(())
    }

    async fn cleanup_expired_tokens(&self) -> Result<usize> {
        let mut tables = lock(&self.tokens)?;
        let now = Utc::now();
        let initial_count = tables.access_tokens.len();
        tables.access_tokens.retain(|_, token| token.expires_at > now);
        Ok(initial_count - tables.access_tokens.len())
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryOAuthStorage {
    async fn store_token_pair(
        &self,
        access_token: &AccessToken,
        refresh_token: Option<&RefreshToken>,
    ) -> Result<()> {
        let mut tables = lock(&self.tokens)?;
        tables
            .access_tokens
            .insert(access_token.token.clone(), access_token.clone());
        if let Some(refresh_token) = refresh_token {
            tables
                .refresh_tokens
                .insert(refresh_token.token.clone(), refresh_token.clone());
        }
        Ok(())
    }

    async fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>> {
        let tables = lock(&self.tokens)?;
        Ok(tables.refresh_tokens.get(token).cloned())
    }

    async fn rotate_refresh_token(
        &self,
        old_token: &str,
        access_token: &AccessToken,
        refresh_token: &RefreshToken,
    ) -> Result<bool> {
        let mut tables = lock(&self.tokens)?;
        if tables.refresh_tokens.remove(old_token).is_none() {
            return Ok(false);
        }
        tables
            .access_tokens
            .insert(access_token.token.clone(), access_token.clone());
        tables
            .refresh_tokens
            .insert(refresh_token.token.clone(), refresh_token.clone());
        Ok(true)
    }

    async fn revoke_refresh_token(&self, token: &str) -> Result<()> {
        let mut tables = lock(&self.tokens)?;
        tables.refresh_tokens.remove(token);
        Ok(())
    }

    async fn revoke_refresh_tokens_for_access_token(&self, access_token: &str) -> Result<usize> {
        let mut tables = lock(&self.tokens)?;
        let initial_count = tables.refresh_tokens.len();
        tables
            .refresh_tokens
            .retain(|_, token| token.access_token != access_token);
        Ok(initial_count - tables.refresh_tokens.len())
    }

    async fn cleanup_expired_refresh_tokens(&self) -> Result<usize> {
        let mut tables = lock(&self.tokens)?;
        let now = Utc::now();
        let initial_count = tables.refresh_tokens.len();
        tables.refresh_tokens.retain(|_, token| token.expires_at > now);
        Ok(initial_count - tables.refresh_tokens.len())
    }
}

#[async_trait]
impl ScopeStore for MemoryOAuthStorage {
    async fn create_scope(&self, scope: &Scope) -> Result<()> {
        let mut scopes = lock(&self.scopes)?;
        if scopes.contains_key(&scope.name) {
            return Err(StorageError::AlreadyExists(format!("scope {}", scope.name)));
        }
        scopes.insert(scope.name.clone(), scope.clone());
        Ok(())
    }

    async fn find_scopes(&self, names: &[String]) -> Result<Vec<Scope>> {
        let scopes = lock(&self.scopes)?;
        Ok(names
            .iter()
            .filter_map(|name| scopes.get(name).cloned())
            .collect())
    }
}

#[async_trait]
impl KeyPersistence for MemoryOAuthStorage {
    async fn load(&self) -> Result<Option<PemKeyPair>> {
        Ok(lock(&self.signing_keys)?.clone())
    }

    async fn save(&self, keys: &PemKeyPair) -> Result<()> {
        *lock(&self.signing_keys)? = Some(keys.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_client(client_id: &str, client_name: &str) -> OAuthClient {
        OAuthClient {
            client_id: client_id.to_string(),
            client_secret_hash: "$2b$04$hash".to_string(),
            client_name: client_name.to_string(),
            grant_types: vec![GrantType::AuthorizationCode],
            response_types: vec![ResponseType::Code],
            token_endpoint_auth_method: ClientAuthMethod::ClientSecretBasic,
            redirect_uris: vec!["https://example.com/callback".to_string()],
            scopes: vec!["read".to_string()],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn test_pair(access: &str, refresh: &str) -> (AccessToken, RefreshToken) {
        let now = Utc::now();
        (
            AccessToken {
                token: access.to_string(),
                client_id: "client".to_string(),
                user_id: Some("user".to_string()),
                scope: Some("read".to_string()),
                created_at: now,
                expires_at: now + Duration::hours(1),
            },
            RefreshToken {
                token: refresh.to_string(),
                access_token: access.to_string(),
                client_id: "client".to_string(),
                user_id: "user".to_string(),
                scope: Some("read".to_string()),
                created_at: now,
                expires_at: now + Duration::days(30),
            },
        )
    }

    #[tokio::test]
    async fn test_client_lookup_ignores_case() {
        let storage = MemoryOAuthStorage::new();
        storage
            .create_client(&test_client("Acme-Client", "Acme"))
            .await
            .unwrap();

        let found = storage.get_client("acme-client").await.unwrap().unwrap();
        assert_eq!(found.client_id, "Acme-Client");
        assert!(storage.client_exists("ACME-CLIENT").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_client_rejects_duplicates() {
        let storage = MemoryOAuthStorage::new();
        storage
            .create_client(&test_client("one", "Acme"))
            .await
            .unwrap();

        let same_id = storage.create_client(&test_client("ONE", "Other")).await;
        assert!(matches!(same_id, Err(StorageError::AlreadyExists(_))));

        let same_name = storage.create_client(&test_client("two", "Acme")).await;
        assert!(matches!(same_name, Err(StorageError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_mark_code_used_has_one_winner() {
        let storage = MemoryOAuthStorage::new();
        let now = Utc::now();
        storage
            .store_code(&AuthorizationCode {
                code: "code-1".to_string(),
                client_id: "client".to_string(),
                user_id: "user".to_string(),
                redirect_uri: "https://example.com/callback".to_string(),
                scope: None,
                code_challenge: None,
                code_challenge_method: None,
                created_at: now,
                expires_at: now + Duration::minutes(10),
                used: false,
            })
            .await
            .unwrap();

        assert!(storage.mark_code_used("code-1").await.unwrap());
        assert!(!storage.mark_code_used("code-1").await.unwrap());
        assert!(!storage.mark_code_used("missing").await.unwrap());
        assert!(storage.get_code("code-1").await.unwrap().unwrap().used);
    }

    #[tokio::test]
    async fn test_rotation_replaces_old_refresh_token() {
        let storage = MemoryOAuthStorage::new();
        let (access, refresh) = test_pair("at-1", "rt-1");
        storage
            .store_token_pair(&access, Some(&refresh))
            .await
            .unwrap();

        let (new_access, new_refresh) = test_pair("at-2", "rt-2");
        assert!(
            storage
                .rotate_refresh_token("rt-1", &new_access, &new_refresh)
                .await
                .unwrap()
        );
        assert!(storage.get_refresh_token("rt-1").await.unwrap().is_none());
        assert!(storage.get_refresh_token("rt-2").await.unwrap().is_some());
        assert!(storage.get_token("at-2").await.unwrap().is_some());

        let (late_access, late_refresh) = test_pair("at-3", "rt-3");
        assert!(
            !storage
                .rotate_refresh_token("rt-1", &late_access, &late_refresh)
                .await
                .unwrap()
        );
        assert!(storage.get_token("at-3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke_refresh_tokens_for_access_token() {
        let storage = MemoryOAuthStorage::new();
        let (access, refresh) = test_pair("at-1", "rt-1");
        storage
            .store_token_pair(&access, Some(&refresh))
            .await
            .unwrap();

        let removed = storage
            .revoke_refresh_tokens_for_access_token("at-1")
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(storage.get_refresh_token("rt-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_token_expiry_cleanup() {
        let storage = MemoryOAuthStorage::new();
        let (mut access, _) = test_pair("at-old", "rt-old");
        access.expires_at = Utc::now() - Duration::seconds(1);
        storage.store_token(&access).await.unwrap();

        // Expired tokens stay visible until cleanup so introspection can report them
        assert!(storage.get_token("at-old").await.unwrap().is_some());
        assert_eq!(storage.cleanup_expired_tokens().await.unwrap(), 1);
        assert!(storage.get_token("at-old").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scope_registry() {
        let storage = MemoryOAuthStorage::new();
        let scope = Scope {
            id: "1".to_string(),
            name: "read".to_string(),
            description: Some("Read access".to_string()),
            created_at: Utc::now(),
        };
        storage.create_scope(&scope).await.unwrap();
        assert!(matches!(
            storage.create_scope(&scope).await,
            Err(StorageError::AlreadyExists(_))
        ));

        let found = storage
            .find_scopes(&["read".to_string(), "write".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "read");
    }
}
