//! Handles /oauth/users, /oauth/login, /oauth/logout and /oauth/consent - End-user accounts, sessions and consent
//!
//! The GET forms of login and consent describe the pending authorization
//! request so a front end can collect credentials or approval and then
//! follow `continue` back to the authorization endpoint.

use axum::{
    Form, Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::{
    context::AppState,
    utils_oauth::{
        ErrorResponse, clear_session_cookie, oauth_error_response, session_cookie,
        session_from_cookies,
    },
};
use crate::oauth::AuthorizeQuery;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ConsentForm {
    pub client_id: String,
    #[serde(default)]
    pub scope: String,
}

/// POST /oauth/users
pub async fn handle_create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<Response, ErrorResponse> {
    let user = state
        .account_service
        .register(&request.email, &request.password, request.name)
        .await
        .map_err(oauth_error_response)?;

    Ok((StatusCode::CREATED, Json(user)).into_response())
}

fn pending_authorization(step: &str, query: &AuthorizeQuery) -> Json<serde_json::Value> {
    Json(json!({
        "step": step,
        "client_id": query.client_id,
        "scope": query.scope,
        "continue": format!("/oauth/authorize?{}", query.to_query_string()),
    }))
}

/// GET /oauth/login
pub async fn handle_login_page(Query(query): Query<AuthorizeQuery>) -> Response {
    pending_authorization("login", &query).into_response()
}

/// GET /oauth/consent
pub async fn handle_consent_page(Query(query): Query<AuthorizeQuery>) -> Response {
    pending_authorization("consent", &query).into_response()
}

/// POST /oauth/login
pub async fn handle_login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, ErrorResponse> {
    let session = state
        .account_service
        .login(&form.email, &form.password)
        .await
        .map_err(oauth_error_response)?;

    let max_age = (session.expires_at - Utc::now()).num_seconds();
    Ok((
        [(SET_COOKIE, session_cookie(&session.session_id, max_age))],
        Json(json!({
            "session_id": session.session_id,
            "user_id": session.user_id,
            "expires_at": session.expires_at,
        })),
    )
        .into_response())
}

/// POST /oauth/consent
pub async fn handle_consent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ConsentForm>,
) -> Result<Response, ErrorResponse> {
    let session_id = session_from_cookies(&headers);
    state
        .account_service
        .grant_consent(session_id.as_deref(), &form.client_id, &form.scope)
        .await
        .map_err(oauth_error_response)?;

    Ok(Json(json!({
        "client_id": form.client_id,
        "scope": form.scope,
    }))
    .into_response())
}

/// GET /oauth/logout
pub async fn handle_logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ErrorResponse> {
    let session_id = session_from_cookies(&headers);
    state
        .account_service
        .logout(session_id.as_deref())
        .await
        .map_err(oauth_error_response)?;

    Ok((
        [(SET_COOKIE, clear_session_cookie())],
        Json(json!({ "logged_out": true })),
    )
        .into_response())
}
