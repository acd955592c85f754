//! Handles OAuth 2.0 well-known discovery endpoints - authorization server metadata and JWKS

use axum::{extract::State, response::Json};
use serde_json::{Value, json};

use super::{
    context::AppState,
    utils_oauth::{ErrorResponse, oauth_error_response},
};
use crate::errors::OAuthError;
use crate::oauth::JwkSet;

/// OAuth 2.0 Authorization Server Metadata handler
/// GET /.well-known/oauth-authorization-server
///
/// Returns metadata about the OAuth authorization server as specified by RFC 8414.
pub async fn oauth_authorization_server_handler(State(state): State<AppState>) -> Json<Value> {
    let base = &state.config.external_base;
    let mut metadata = json!({
        "issuer": base,
        "authorization_endpoint": format!("{}/oauth/authorize", base),
        "token_endpoint": format!("{}/oauth/token", base),
        "userinfo_endpoint": format!("{}/oauth/userinfo", base),
        "jwks_uri": format!("{}/.well-known/jwks.json", base),
        "revocation_endpoint": format!("{}/oauth/revoke", base),
        "introspection_endpoint": format!("{}/oauth/introspect", base),
        "response_types_supported": ["code"],
        "response_modes_supported": ["query"],
        "grant_types_supported": ["authorization_code", "client_credentials", "refresh_token"],
        "token_endpoint_auth_methods_supported": ["client_secret_basic", "client_secret_post", "none"],
        "code_challenge_methods_supported": ["S256"]
    });

    if *state.config.enable_client_api.as_ref() {
        metadata["registration_endpoint"] = json!(format!("{}/oauth/clients/register", base));
    }

    Json(metadata)
}

/// JWKS (JSON Web Key Set) handler
/// GET /.well-known/jwks.json
///
/// Returns the cached public key used to sign access tokens.
pub async fn jwks_handler(State(state): State<AppState>) -> Result<Json<JwkSet>, ErrorResponse> {
    state.key_manager.jwks().map(Json).map_err(|e| {
        tracing::error!(error = ?e, "JWKS requested before keys were available");
        oauth_error_response(OAuthError::TemporarilyUnavailable(
            "Signing keys are not available".to_string(),
        ))
    })
}
