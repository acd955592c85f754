//! Handles GET /oauth/authorize - Runs the authorization state machine and redirects with a code

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
};

use super::{
    context::AppState,
    utils_oauth::{oauth_error_response, session_from_cookies},
};
use crate::errors::OAuthError;
use crate::oauth::{AuthorizeError, AuthorizeQuery};

pub async fn handle_oauth_authorize(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AuthorizeQuery>,
) -> Response {
    let session_id = session_from_cookies(&headers);
    let query_string = query.to_query_string();

    let request = match query.into_request(session_id) {
        Ok(request) => request,
        Err(e) => return authorize_error_response(e, &query_string),
    };

    match state.authorization_engine.authorize(request).await {
        Ok(issued) => match issued.redirect_url() {
            Ok(location) => redirect(StatusCode::FOUND, &location),
            Err(e) => oauth_error_response(e).into_response(),
        },
        Err(e) => authorize_error_response(e, &query_string),
    }
}

fn authorize_error_response(error: AuthorizeError, query_string: &str) -> Response {
    match &error.error {
        OAuthError::NotAuthenticated(_) => {
            return redirect(StatusCode::SEE_OTHER, &format!("/oauth/login?{}", query_string));
        }
        OAuthError::ConsentRequired(_) => {
            return redirect(StatusCode::SEE_OTHER, &format!("/oauth/consent?{}", query_string));
        }
        _ => {}
    }

    match error.redirect_url() {
        Some(location) => redirect(StatusCode::FOUND, &location),
        None => oauth_error_response(error.error).into_response(),
    }
}

fn redirect(status: StatusCode, location: &str) -> Response {
    (status, [(LOCATION, location.to_string())]).into_response()
}
