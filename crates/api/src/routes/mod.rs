//! API routes

pub mod health;
pub mod subscriptions;
pub mod webhook;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{auth::require_auth, state::AppState};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/health", get(health::health));

    // Ezee payment notifications carry no bearer token; the endpoint is
    // public and does its own body-level validation.
    let public_api_routes = Router::new().route("/billing/webhook", post(webhook::receive));

    // Protected API routes (auth required) - under /api/v1
    let protected_api_routes = Router::new()
        .route("/billing/subscription/status", post(subscriptions::status))
        .route("/billing/subscription/cancel", post(subscriptions::cancel))
        .layer(middleware::from_fn_with_state(auth_state, require_auth));

    // Browser clients authenticate with bearer tokens, not cookies, so the
    // CORS policy can stay permissive.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1_routes = Router::new()
        .merge(public_api_routes)
        .merge(protected_api_routes);

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
