//! Main router configuration assembling the OAuth, account and discovery endpoints.

use axum::{
    Router,
    http::{Method, header},
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::{
    context::AppState,
    handler_accounts::{
        handle_consent, handle_consent_page, handle_create_user, handle_login, handle_login_page,
        handle_logout,
    },
    handler_health::handle_health,
    handler_oauth::{handle_oauth_introspect, handle_oauth_revoke, handle_oauth_token},
    handler_oauth_authorize::handle_oauth_authorize,
    handler_oauth_clients::{app_create_scope_handler, app_register_client_handler},
    handler_userinfo::get_userinfo_handler,
    handler_well_known::{jwks_handler, oauth_authorization_server_handler},
};

/// Build the application router
pub fn build_router(ctx: AppState) -> Router {
    let mut oauth_routes = Router::new()
        .route("/authorize", get(handle_oauth_authorize))
        .route("/token", post(handle_oauth_token))
        .route("/introspect", post(handle_oauth_introspect))
        .route("/revoke", post(handle_oauth_revoke))
        .route("/userinfo", get(get_userinfo_handler))
        .route("/users", post(handle_create_user))
        .route("/login", get(handle_login_page).post(handle_login))
        .route("/logout", get(handle_logout))
        .route("/consent", get(handle_consent_page).post(handle_consent));

    // Conditionally add client API endpoints
    if *ctx.config.enable_client_api.as_ref() {
        oauth_routes = oauth_routes
            .route("/clients/register", post(app_register_client_handler))
            .route("/scopes", post(app_create_scope_handler));
    }

    let well_known_routes = Router::new()
        .route(
            "/oauth-authorization-server",
            get(oauth_authorization_server_handler),
        )
        .route("/jwks.json", get(jwks_handler));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    Router::new()
        .route("/health", get(handle_health))
        .nest("/oauth", oauth_routes)
        .nest("/.well-known", well_known_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
