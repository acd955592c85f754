//! Authorization endpoint state machine.
//!
//! Checks run strictly in order: response type, client, redirect URI,
//! session, user, consent. Only after the redirect URI has matched the
//! client's registration may an error be delivered by redirect.

use crate::errors::{ClientRegistrationError, OAuthError};
use crate::oauth::clients::ClientRegistry;
use crate::oauth::deadline::{bounded, storage};
use crate::oauth::types::*;
use crate::storage::traits::{ConsentOracle, OAuthStorage, SessionOracle, UserDirectory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// Query parameters of the authorization endpoint, unvalidated
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizeQuery {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

impl AuthorizeQuery {
    /// Parse into a typed request; `session_id` usually comes from a cookie.
    ///
    /// Nothing here is redirect-safe yet, so every error is generic.
    pub fn into_request(
        self,
        session_id: Option<String>,
    ) -> Result<AuthorizationRequest, AuthorizeError> {
        let response_type = self
            .response_type
            .as_deref()
            .ok_or_else(|| {
                AuthorizeError::generic(OAuthError::InvalidRequest(
                    "response_type is required".to_string(),
                ))
            })?
            .parse::<ResponseType>()
            .map_err(|e| AuthorizeError::generic(OAuthError::UnsupportedResponseType(e)))?;

        let client_id = required(self.client_id, "client_id")?;
        let redirect_uri = required(self.redirect_uri, "redirect_uri")?;

        let code_challenge_method = match (&self.code_challenge, self.code_challenge_method.as_deref()) {
            (Some(_), Some(method)) => Some(
                method
                    .parse::<CodeChallengeMethod>()
                    .map_err(|e| AuthorizeError::generic(OAuthError::InvalidRequest(e)))?,
            ),
            (Some(_), None) => {
                return Err(AuthorizeError::generic(OAuthError::InvalidRequest(
                    "code_challenge_method is required with code_challenge".to_string(),
                )));
            }
            (None, Some(_)) => {
                return Err(AuthorizeError::generic(OAuthError::InvalidRequest(
                    "code_challenge_method without code_challenge".to_string(),
                )));
            }
            (None, None) => None,
        };

        if let Some(scope) = &self.scope {
            if !validate_scope(scope) {
                return Err(AuthorizeError::generic(OAuthError::InvalidRequest(
                    "malformed scope".to_string(),
                )));
            }
        }

        Ok(AuthorizationRequest {
            response_type,
            client_id,
            redirect_uri,
            scope: self.scope.filter(|s| !s.trim().is_empty()),
            state: self.state,
            code_challenge: self.code_challenge,
            code_challenge_method,
            session_id: session_id.filter(|s| !s.is_empty()),
        })
    }

    /// Re-encode for handing the request on to the login or consent page
    pub fn to_query_string(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        let pairs = [
            ("response_type", &self.response_type),
            ("client_id", &self.client_id),
            ("redirect_uri", &self.redirect_uri),
            ("scope", &self.scope),
            ("state", &self.state),
            ("code_challenge", &self.code_challenge),
            ("code_challenge_method", &self.code_challenge_method),
        ];
        for (name, value) in pairs {
            if let Some(value) = value {
                serializer.append_pair(name, value);
            }
        }
        serializer.finish()
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, AuthorizeError> {
    value.filter(|v| !v.is_empty()).ok_or_else(|| {
        AuthorizeError::generic(OAuthError::InvalidRequest(format!("{} is required", name)))
    })
}

/// A failed authorization.
///
/// `redirect_uri` is set only once the URI has matched the client's
/// registration; without it the caller must not redirect.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct AuthorizeError {
    pub error: OAuthError,
    pub redirect_uri: Option<String>,
    pub state: Option<String>,
}

impl AuthorizeError {
    fn generic(error: OAuthError) -> Self {
        Self {
            error,
            redirect_uri: None,
            state: None,
        }
    }

    fn redirectable(error: OAuthError, request: &AuthorizationRequest) -> Self {
        Self {
            error,
            redirect_uri: Some(request.redirect_uri.clone()),
            state: request.state.clone(),
        }
    }

    /// `redirect_uri?error=…&error_description=…&state=…`, when redirect-safe
    pub fn redirect_url(&self) -> Option<String> {
        let mut url = Url::parse(self.redirect_uri.as_deref()?).ok()?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("error", self.error.error_code());
            query.append_pair("error_description", &self.error.description());
            if let Some(state) = &self.state {
                query.append_pair("state", state);
            }
        }
        Some(url.to_string())
    }
}

/// A minted authorization code and what the caller needs to redirect
#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: String,
    pub redirect_uri: String,
    pub state: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl IssuedCode {
    /// `redirect_uri?code=…&state=…`
    pub fn redirect_url(&self) -> Result<String, OAuthError> {
        let mut url = Url::parse(&self.redirect_uri)
            .map_err(|e| OAuthError::ServerError(format!("Invalid redirect URI: {}", e)))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("code", &self.code);
            if let Some(state) = &self.state {
                query.append_pair("state", state);
            }
        }
        Ok(url.to_string())
    }
}

/// Authorization engine configuration
#[derive(Debug, Clone)]
pub struct AuthorizationSettings {
    pub code_lifetime: chrono::Duration,
    pub timeout: Duration,
}

pub struct AuthorizationEngine {
    registry: Arc<ClientRegistry>,
    sessions: Arc<dyn SessionOracle>,
    users: Arc<dyn UserDirectory>,
    consents: Arc<dyn ConsentOracle>,
    codes: Arc<dyn OAuthStorage>,
    settings: AuthorizationSettings,
}

impl AuthorizationEngine {
    pub fn new(
        registry: Arc<ClientRegistry>,
        sessions: Arc<dyn SessionOracle>,
        users: Arc<dyn UserDirectory>,
        consents: Arc<dyn ConsentOracle>,
        codes: Arc<dyn OAuthStorage>,
        settings: AuthorizationSettings,
    ) -> Self {
        Self {
            registry,
            sessions,
            users,
            consents,
            codes,
            settings,
        }
    }

    /// Run the authorization state machine and persist a code on success
    pub async fn authorize(
        &self,
        request: AuthorizationRequest,
    ) -> Result<IssuedCode, AuthorizeError> {
        let started = Instant::now();
        let timeout = self.settings.timeout;

        if request.response_type != ResponseType::Code {
            tracing::warn!(client_id = %request.client_id, response_type = %request.response_type, "Unsupported response type");
            return Err(AuthorizeError::generic(OAuthError::UnsupportedResponseType(
                request.response_type.to_string(),
            )));
        }

        let client = match bounded(timeout, "client lookup", self.registry.find(&request.client_id)).await {
            Ok(Ok(client)) => client,
            Ok(Err(ClientRegistrationError::ClientNotFound(_))) => {
                tracing::warn!(client_id = %request.client_id, "Authorization for unknown client");
                return Err(AuthorizeError::generic(OAuthError::InvalidClient(
                    "Client authentication failed".to_string(),
                )));
            }
            Ok(Err(e)) => {
                tracing::error!(client_id = %request.client_id, error = ?e, "Client lookup failed");
                return Err(AuthorizeError::generic(OAuthError::ServerError(
                    "Client lookup failed".to_string(),
                )));
            }
            Err(e) => return Err(AuthorizeError::generic(e)),
        };
        tracing::debug!(client_id = %client.client_id, "Client validated");

        if !client.has_redirect_uri(&request.redirect_uri) {
            tracing::warn!(client_id = %client.client_id, "Redirect URI is not registered");
            return Err(AuthorizeError::generic(OAuthError::InvalidRedirectUri(
                "Redirect URI is not registered for this client".to_string(),
            )));
        }
        tracing::debug!(client_id = %client.client_id, "Redirect URI validated");

        let redirectable = |error: OAuthError| AuthorizeError::redirectable(error, &request);

        if !client.supports_grant(GrantType::AuthorizationCode) {
            return Err(redirectable(OAuthError::UnauthorizedClient(
                "Client is not allowed the authorization_code grant".to_string(),
            )));
        }
        if let Some(scope) = &request.scope {
            if !client.allows_scope(&parse_scope(scope)) {
                return Err(redirectable(OAuthError::InvalidScope(
                    "Requested scope exceeds the client's scopes".to_string(),
                )));
            }
        }

        let session_id = match &request.session_id {
            Some(session_id) => session_id.clone(),
            None => {
                tracing::debug!(client_id = %client.client_id, "No session presented");
                return Err(redirectable(OAuthError::NotAuthenticated(
                    "Login required".to_string(),
                )));
            }
        };
        let session_exists = storage(timeout, "session check", self.sessions.exists(&session_id))
            .await
            .map_err(redirectable)?;
        if !session_exists {
            tracing::debug!(client_id = %client.client_id, "Session does not exist");
            return Err(redirectable(OAuthError::NotAuthenticated(
                "Login required".to_string(),
            )));
        }
        tracing::debug!(client_id = %client.client_id, "Session validated");

        let user_id = storage(timeout, "session user lookup", self.sessions.user_id(&session_id))
            .await
            .map_err(redirectable)?
            .ok_or_else(|| {
                tracing::error!(client_id = %client.client_id, "Session has no user");
                redirectable(OAuthError::ServerError("Session has no user".to_string()))
            })?;
        let user = storage(timeout, "user lookup", self.users.find_by_id(&user_id))
            .await
            .map_err(redirectable)?
            .ok_or_else(|| {
                tracing::error!(user_id = %user_id, "Session user does not exist");
                redirectable(OAuthError::ServerError("Unknown user".to_string()))
            })?;
        tracing::debug!(user_id = %user.id, "User resolved");

        let scope = request.scope.clone().unwrap_or_default();
        let consented = storage(
            timeout,
            "consent check",
            self.consents
                .has_consented(&user.id, &client.client_id, &scope),
        )
        .await
        .map_err(redirectable)?;
        if !consented {
            tracing::debug!(user_id = %user.id, client_id = %client.client_id, "Consent required");
            return Err(redirectable(OAuthError::ConsentRequired(
                "Consent required".to_string(),
            )));
        }
        tracing::debug!(user_id = %user.id, client_id = %client.client_id, "Consent validated");

        let now = Utc::now();
        let code = AuthorizationCode {
            code: generate_token(),
            client_id: client.client_id.clone(),
            user_id: user.id.clone(),
            redirect_uri: request.redirect_uri.clone(),
            scope: request.scope.clone(),
            code_challenge: request.code_challenge.clone(),
            code_challenge_method: request.code_challenge_method,
            created_at: now,
            expires_at: now + self.settings.code_lifetime,
            used: false,
        };
        storage(timeout, "code persistence", self.codes.store_code(&code))
            .await
            .map_err(redirectable)?;

        tracing::info!(
            client_id = %client.client_id,
            user_id = %user.id,
            pkce = code.code_challenge.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Issued authorization code"
        );

        Ok(IssuedCode {
            code: code.code,
            redirect_uri: code.redirect_uri,
            state: request.state,
            expires_at: code.expires_at,
        })
    }
}
