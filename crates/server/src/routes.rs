pub mod auth;

use axum::{
    middleware,
    routing::{any, get, post},
    Json, Router,
};
use common::types::Health;
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::session::session_layer;
use auth::ServerState;

pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

/// Build the full application router: the auth surface behind the session
/// layer, plus an unguarded health probe.
pub fn build_router(state: ServerState) -> Router {
    let paths = state.auth.routes().clone();

    let app = Router::new()
        .route(&paths.login, get(auth::login_page))
        .route(&paths.login_submit, post(auth::login_submit))
        .route(&paths.logout, any(auth::logout))
        .route(&paths.register, get(auth::register_page))
        .route(&paths.register_submit, post(auth::register_submit))
        .route(&paths.home, get(auth::home))
        .route_layer(middleware::from_fn_with_state(state.sessions.clone(), session_layer));

    app.route("/health", get(health))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO).include_headers(false))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO).include_headers(false))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
}
