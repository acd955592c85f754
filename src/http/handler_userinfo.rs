//! Handles GET /oauth/userinfo - Claims about the user behind a bearer access token

use axum::{
    extract::State,
    http::HeaderMap,
    response::Json,
};

use super::{
    context::AppState,
    utils_oauth::{ErrorResponse, bearer_token, oauth_error_response},
};
use crate::errors::{HttpError, OAuthError};
use crate::oauth::UserInfo;

/// GET /oauth/userinfo
///
/// The token must carry a valid signature, be stored, and be unexpired.
pub async fn get_userinfo_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserInfo>, ErrorResponse> {
    let token = bearer_token(&headers).ok_or_else(|| {
        oauth_error_response(OAuthError::InvalidToken(
            HttpError::MissingBearerToken.to_string(),
        ))
    })?;

    state
        .account_service
        .userinfo(token)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::debug!(error = ?e, "Userinfo request rejected");
            oauth_error_response(e)
        })
}
