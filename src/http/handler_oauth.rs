//! Handles POST /oauth/token, /oauth/introspect and /oauth/revoke

use axum::{
    Form, Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{
    context::AppState,
    utils_oauth::{ErrorResponse, oauth_error_response},
};
use crate::oauth::{
    IntrospectionResponse, TokenForm, TokenRequest, TokenResponse, TokenTypeHint,
    token::extract_client_auth,
};
use crate::errors::OAuthError;

/// Form data for the introspection and revocation endpoints
#[derive(Debug, Deserialize)]
pub struct TokenHintForm {
    #[serde(default)]
    pub token: String,
    pub token_type_hint: Option<String>,
}

/// POST /oauth/token
pub async fn handle_oauth_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<TokenForm>,
) -> Result<Json<TokenResponse>, ErrorResponse> {
    let client_auth = extract_client_auth(
        &headers,
        form.client_id.as_deref(),
        form.client_secret.as_deref(),
    )
    .map_err(oauth_error_response)?;

    let request = TokenRequest::try_from(form).map_err(oauth_error_response)?;

    state
        .token_engine
        .token(request, client_auth)
        .await
        .map(Json)
        .map_err(oauth_error_response)
}

/// POST /oauth/introspect
pub async fn handle_oauth_introspect(
    State(state): State<AppState>,
    Form(form): Form<TokenHintForm>,
) -> Result<Json<IntrospectionResponse>, ErrorResponse> {
    // Unknown hints only reorder lookups elsewhere; here they are ignored.
    let hint = TokenTypeHint::parse(form.token_type_hint.as_deref()).unwrap_or(None);

    state
        .introspection_engine
        .introspect(&form.token, hint)
        .await
        .map(Json)
        .map_err(oauth_error_response)
}

/// POST /oauth/revoke
pub async fn handle_oauth_revoke(
    State(state): State<AppState>,
    Form(form): Form<TokenHintForm>,
) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    if form.token.is_empty() {
        return Err(oauth_error_response(OAuthError::InvalidRequest(
            "token is required".to_string(),
        )));
    }

    state
        .revocation_engine
        .revoke_with_hint(&form.token, form.token_type_hint.as_deref())
        .await
        .map_err(oauth_error_response)?;

    Ok((StatusCode::OK, Json(json!({}))))
}
