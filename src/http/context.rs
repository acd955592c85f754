//! Application state shared by every handler.

use std::sync::Arc;

use crate::config::Config;
use crate::oauth::{
    AccountService, AccountSettings, AuthorizationEngine, AuthorizationSettings, ClientRegistry,
    IntrospectionEngine, KeyManager, RevocationEngine, ScopeService, TokenEngine, TokenIssuer,
    TokenSettings,
};
use crate::storage::Storage;
use crate::storage::traits::SessionOracle;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Signing keys; must be initialized before the router serves requests
    pub key_manager: Arc<KeyManager>,
    pub client_registry: Arc<ClientRegistry>,
    pub authorization_engine: Arc<AuthorizationEngine>,
    pub token_engine: Arc<TokenEngine>,
    pub introspection_engine: Arc<IntrospectionEngine>,
    pub revocation_engine: Arc<RevocationEngine>,
    pub account_service: Arc<AccountService>,
    pub scope_service: Arc<ScopeService>,
}

impl AppState {
    /// Wire the engines over the given storage and session backends
    pub fn new(
        config: Arc<Config>,
        storage: &Storage,
        sessions: Arc<dyn SessionOracle>,
        key_manager: Arc<KeyManager>,
        bcrypt_cost: u32,
    ) -> Self {
        let timeout = *config.collaborator_timeout.as_ref();

        let client_registry = Arc::new(
            ClientRegistry::new(storage.oauth.clone(), storage.scopes.clone())
                .with_bcrypt_cost(bcrypt_cost),
        );
        let token_issuer = Arc::new(TokenIssuer::new(
            key_manager.clone(),
            config.external_base.clone(),
            config.refresh_token_secret.as_ref(),
        ));

        let authorization_engine = Arc::new(AuthorizationEngine::new(
            client_registry.clone(),
            sessions.clone(),
            storage.users.clone(),
            storage.consents.clone(),
            storage.oauth.clone(),
            AuthorizationSettings {
                code_lifetime: *config.authorization_code_expiration.as_ref(),
                timeout,
            },
        ));
        let token_engine = Arc::new(TokenEngine::new(
            client_registry.clone(),
            storage.oauth.clone(),
            token_issuer.clone(),
            TokenSettings {
                access_token_lifetime: *config.access_token_expiration.as_ref(),
                refresh_token_lifetime: *config.refresh_token_expiration.as_ref(),
                timeout,
            },
        ));
        let introspection_engine = Arc::new(IntrospectionEngine::new(storage.oauth.clone(), timeout));
        let revocation_engine = Arc::new(
            RevocationEngine::new(storage.oauth.clone(), timeout)
                .with_cascade(*config.revocation_cascade.as_ref()),
        );
        let account_service = Arc::new(AccountService::new(
            storage.users.clone(),
            sessions,
            storage.consents.clone(),
            client_registry.clone(),
            storage.oauth.clone(),
            token_issuer,
            AccountSettings {
                session_lifetime: *config.session_expiration.as_ref(),
                timeout,
                bcrypt_cost,
            },
        ));
        let scope_service = Arc::new(ScopeService::new(storage.scopes.clone(), timeout));

        Self {
            config,
            key_manager,
            client_registry,
            authorization_engine,
            token_engine,
            introspection_engine,
            revocation_engine,
            account_service,
            scope_service,
        }
    }
}
