//! Handles POST /oauth/clients/register and POST /oauth/scopes - Client and scope registration

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::Json as ResponseJson,
};

use super::utils_oauth::{ErrorResponse, client_registration_error_response, oauth_error_response};
use crate::{
    http::context::AppState,
    oauth::{ClientRegistrationRequest, ClientRegistrationResponse, CreateScopeRequest},
    oauth::types::{NewClient, Scope},
};

pub async fn app_register_client_handler(
    State(state): State<AppState>,
    Json(request): Json<ClientRegistrationRequest>,
) -> Result<(StatusCode, ResponseJson<ClientRegistrationResponse>), ErrorResponse> {
    let new_client = NewClient::try_from(request).map_err(client_registration_error_response)?;

    match state.client_registry.create(new_client).await {
        Ok(registered) => Ok((StatusCode::CREATED, ResponseJson(registered.into()))),
        Err(e) => Err(client_registration_error_response(e)),
    }
}

pub async fn app_create_scope_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateScopeRequest>,
) -> Result<(StatusCode, ResponseJson<Scope>), ErrorResponse> {
    state
        .scope_service
        .create_scope(request)
        .await
        .map(|scope| (StatusCode::CREATED, ResponseJson(scope)))
        .map_err(oauth_error_response)
}
