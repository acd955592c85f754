//! Client registry: creation, lookup and secret verification.
//!
//! Secrets are bcrypt-hashed; the plaintext leaves the registry exactly once,
//! in the [`RegisteredClient`] returned by [`ClientRegistry::create`].

use crate::errors::{ClientRegistrationError, StorageError};
use crate::oauth::types::*;
use crate::storage::traits::{OAuthStorage, ScopeStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

/// Client registration request as received on the wire
#[derive(Debug, Clone, Deserialize)]
pub struct ClientRegistrationRequest {
    pub client_name: String,
    #[serde(default)]
    pub grant_types: Vec<String>,
    #[serde(default)]
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: Option<String>,
    pub redirect_uris: Option<Vec<String>>,
    /// Space separated
    pub scope: Option<String>,
}

impl TryFrom<ClientRegistrationRequest> for NewClient {
    type Error = ClientRegistrationError;

    fn try_from(request: ClientRegistrationRequest) -> Result<Self, Self::Error> {
        let grant_types = request
            .grant_types
            .iter()
            .map(|value| value.parse::<GrantType>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(ClientRegistrationError::InvalidClientMetadata)?;
        let response_types = request
            .response_types
            .iter()
            .map(|value| value.parse::<ResponseType>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(ClientRegistrationError::InvalidClientMetadata)?;
        let token_endpoint_auth_method = match request.token_endpoint_auth_method.as_deref() {
            Some(value) => value
                .parse::<ClientAuthMethod>()
                .map_err(ClientRegistrationError::InvalidClientMetadata)?,
            None => ClientAuthMethod::ClientSecretBasic,
        };
        let scopes = request
            .scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        Ok(NewClient {
            client_name: request.client_name,
            grant_types,
            response_types,
            token_endpoint_auth_method,
            redirect_uris: request.redirect_uris,
            scopes,
        })
    }
}

/// Client registration response; the only response that ever carries the secret
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRegistrationResponse {
    pub client_id: String,
    pub client_secret: String,
    pub client_name: String,
    pub grant_types: Vec<GrantType>,
    pub response_types: Vec<ResponseType>,
    pub token_endpoint_auth_method: ClientAuthMethod,
    pub redirect_uris: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub client_id_issued_at: i64,
}

impl From<RegisteredClient> for ClientRegistrationResponse {
    fn from(registered: RegisteredClient) -> Self {
        let client = registered.client;
        let scope = (!client.scopes.is_empty()).then(|| client.scopes.join(" "));
        Self {
            client_id: client.client_id,
            client_secret: registered.client_secret,
            client_name: client.client_name,
            grant_types: client.grant_types,
            response_types: client.response_types,
            token_endpoint_auth_method: client.token_endpoint_auth_method,
            redirect_uris: client.redirect_uris,
            scope,
            client_id_issued_at: client.created_at.timestamp(),
        }
    }
}

/// Client Registry
pub struct ClientRegistry {
    storage: Arc<dyn OAuthStorage>,
    scopes: Arc<dyn ScopeStore>,
    /// bcrypt work factor for client secrets
    bcrypt_cost: u32,
}

impl ClientRegistry {
    pub fn new(storage: Arc<dyn OAuthStorage>, scopes: Arc<dyn ScopeStore>) -> Self {
        Self {
            storage,
            scopes,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Override the bcrypt work factor
    pub fn with_bcrypt_cost(mut self, bcrypt_cost: u32) -> Self {
        self.bcrypt_cost = bcrypt_cost;
        self
    }

    /// Create a client and return it with its plaintext secret
    pub async fn create(&self, request: NewClient) -> Result<RegisteredClient, ClientRegistrationError> {
        self.validate(&request).await?;

        let client_id = generate_client_id();
        let client_secret = generate_token();
        let client_secret_hash = hash_secret(client_secret.clone(), self.bcrypt_cost).await?;

        let now = Utc::now();
        let client = OAuthClient {
            client_id,
            client_secret_hash,
            client_name: request.client_name.trim().to_string(),
            grant_types: request.grant_types,
            response_types: request.response_types,
            token_endpoint_auth_method: request.token_endpoint_auth_method,
            redirect_uris: request.redirect_uris.unwrap_or_default(),
            scopes: request.scopes,
            created_at: now,
            updated_at: now,
        };

        self.storage
            .create_client(&client)
            .await
            .map_err(|e| match e {
                StorageError::AlreadyExists(message) => {
                    ClientRegistrationError::ClientAlreadyExists(message)
                }
                other => ClientRegistrationError::Storage(other),
            })?;

        tracing::info!(client_id = %client.client_id, client_name = %client.client_name, "Created client");

        Ok(RegisteredClient {
            client,
            client_secret,
        })
    }

    /// Look up a client, ignoring ASCII case in the id
    pub async fn find(&self, client_id: &str) -> Result<OAuthClient, ClientRegistrationError> {
        self.storage
            .get_client(client_id)
            .await?
            .ok_or_else(|| ClientRegistrationError::ClientNotFound(client_id.to_string()))
    }

    /// Verify a presented secret against the stored hash
    pub async fn validate_secret(
        &self,
        client: &OAuthClient,
        provided_secret: &str,
    ) -> Result<(), ClientRegistrationError> {
        let hash = client.client_secret_hash.clone();
        let provided_secret = provided_secret.to_string();

        let verified = tokio::task::spawn_blocking(move || bcrypt::verify(provided_secret, &hash))
            .await
            .map_err(|e| ClientRegistrationError::HashingFailed(e.to_string()))?;

        match verified {
            Ok(true) => Ok(()),
            Ok(false) => Err(ClientRegistrationError::InvalidClientSecret),
            Err(e) => {
                tracing::warn!(client_id = %client.client_id, error = ?e, "Stored client secret hash is unusable");
                Err(ClientRegistrationError::InvalidClientSecret)
            }
        }
    }

    async fn validate(&self, request: &NewClient) -> Result<(), ClientRegistrationError> {
        if request.client_name.trim().is_empty() {
            return Err(ClientRegistrationError::InvalidClientMetadata(
                "client_name is required".to_string(),
            ));
        }
        if request.grant_types.is_empty() {
            return Err(ClientRegistrationError::InvalidClientMetadata(
                "grant_types must not be empty".to_string(),
            ));
        }
        if request.response_types.is_empty() {
            return Err(ClientRegistrationError::InvalidClientMetadata(
                "response_types must not be empty".to_string(),
            ));
        }

        match &request.redirect_uris {
            Some(uris) if uris.is_empty() => {
                return Err(ClientRegistrationError::InvalidRedirectUri(
                    "redirect_uris must not be empty when present".to_string(),
                ));
            }
            Some(uris) => {
                for uri in uris {
                    validate_redirect_uri(uri)?;
                }
            }
            None if request.response_types.contains(&ResponseType::Code) => {
                return Err(ClientRegistrationError::InvalidRedirectUri(
                    "redirect_uris are required for the code response type".to_string(),
                ));
            }
            None => {}
        }

        if request.scopes.is_empty() {
            return Ok(());
        }
        if let Some(invalid) = request.scopes.iter().find(|s| !validate_scope(s)) {
            return Err(ClientRegistrationError::InvalidScope(invalid.clone()));
        }
        let known = self.scopes.find_scopes(&request.scopes).await?;
        if let Some(unknown) = request
            .scopes
            .iter()
            .find(|name| !known.iter().any(|scope| &scope.name == *name))
        {
            return Err(ClientRegistrationError::InvalidScope(format!(
                "unknown scope {}",
                unknown
            )));
        }
        Ok(())
    }
}

fn validate_redirect_uri(uri: &str) -> Result<(), ClientRegistrationError> {
    let parsed = Url::parse(uri)
        .map_err(|e| ClientRegistrationError::InvalidRedirectUri(format!("{}: {}", uri, e)))?;
    if parsed.fragment().is_some() {
        return Err(ClientRegistrationError::InvalidRedirectUri(format!(
            "{}: fragments are not allowed",
            uri
        )));
    }
    Ok(())
}

/// bcrypt-hash a secret off the async runtime
async fn hash_secret(secret: String, cost: u32) -> Result<String, ClientRegistrationError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(secret, cost))
        .await
        .map_err(|e| ClientRegistrationError::HashingFailed(e.to_string()))?
        .map_err(|e| ClientRegistrationError::HashingFailed(e.to_string()))
}
