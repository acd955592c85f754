//! Error rendering and request helpers shared by the OAuth handlers.

use axum::{
    Json,
    http::{HeaderMap, StatusCode, header::COOKIE},
};

use crate::errors::{ClientRegistrationError, OAuthError};
use crate::oauth::OAuthErrorResponse;

/// Name of the cookie carrying the end-user session identifier
pub const SESSION_COOKIE: &str = "session_id";

pub type ErrorResponse = (StatusCode, Json<OAuthErrorResponse>);

fn error_body(error: &str, description: String) -> Json<OAuthErrorResponse> {
    Json(OAuthErrorResponse {
        error: error.to_string(),
        error_description: Some(description),
    })
}

/// JSON body `{error, error_description}` with the status derived from the error kind.
///
/// Server errors are logged and described generically.
pub fn oauth_error_response(error: OAuthError) -> ErrorResponse {
    let description = match &error {
        OAuthError::ServerError(_) => {
            tracing::error!(error = ?error, "Request failed");
            "Internal server error".to_string()
        }
        _ => error.description().to_string(),
    };
    (error.status_code(), error_body(error.error_code(), description))
}

pub fn client_registration_error_response(error: ClientRegistrationError) -> ErrorResponse {
    let (status, error_code) = match &error {
        ClientRegistrationError::InvalidClientMetadata(_) => {
            (StatusCode::BAD_REQUEST, "invalid_client_metadata")
        }
        ClientRegistrationError::InvalidRedirectUri(_) => {
            (StatusCode::BAD_REQUEST, "invalid_redirect_uri")
        }
        ClientRegistrationError::InvalidScope(_) => (StatusCode::BAD_REQUEST, "invalid_scope"),
        ClientRegistrationError::ClientAlreadyExists(_) => {
            (StatusCode::CONFLICT, "client_already_exists")
        }
        ClientRegistrationError::ClientNotFound(_) => (StatusCode::NOT_FOUND, "client_not_found"),
        _ => {
            tracing::error!(error = ?error, "Client registration failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("server_error", "Internal server error".to_string()),
            );
        }
    };
    (status, error_body(error_code, error.to_string()))
}

/// Value of the session cookie, if any
pub fn session_from_cookies(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value for a freshly created session
pub fn session_cookie(session_id: &str, max_age_seconds: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        session_id,
        max_age_seconds.max(0)
    )
}

/// `Set-Cookie` value that expires the session cookie
pub fn clear_session_cookie() -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        SESSION_COOKIE
    )
}

/// Token from an `Authorization: Bearer` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_session_from_cookies() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_from_cookies(&headers), None);

        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; session_id=abc123"));
        assert_eq!(session_from_cookies(&headers).as_deref(), Some("abc123"));

        headers.insert(COOKIE, HeaderValue::from_static("session_id="));
        assert_eq!(session_from_cookies(&headers), None);

        headers.insert(COOKIE, HeaderValue::from_str(&clear_session_cookie()).unwrap());
        assert_eq!(session_from_cookies(&headers), None);
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer token-value"),
        );
        assert_eq!(bearer_token(&headers), Some("token-value"));

        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Basic abc"),
        );
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_server_errors_are_generic() {
        let (status, Json(body)) =
            oauth_error_response(OAuthError::ServerError("database exploded".to_string()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "server_error");
        assert_eq!(body.error_description.as_deref(), Some("Internal server error"));
    }
}
