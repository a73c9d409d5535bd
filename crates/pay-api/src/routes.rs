//! # Routes
//!
//! Axum router for the checkout server.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, get_service, post},
    Router,
};
use tower_http::{
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - Pages (from `static_dir`):
///   - GET /        - index.html (checkout page)
///   - GET /success - success.html
///   - GET /cancel  - error.html
///   - anything else under `static_dir`, 404 otherwise
///
/// - API:
///   - POST /create-session - Create a hosted Checkout Session
///   - GET  /health         - Health check
///
/// - Webhooks (raw body):
///   - POST /webhook - Stripe webhook handler
pub fn create_router(state: AppState) -> Router {
    let static_dir = state.config.static_dir.clone();

    let page_routes = Router::<AppState>::new()
        .route("/", get_service(ServeFile::new(static_dir.join("index.html"))))
        .route("/success", get_service(ServeFile::new(static_dir.join("success.html"))))
        .route("/cancel", get_service(ServeFile::new(static_dir.join("error.html"))));

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/create-session", post(handlers::create_session));

    // Extracts `Bytes`, never `Json`: the signature covers the raw body
    let webhook_routes = Router::new().route("/webhook", post(handlers::webhook));

    Router::new()
        .merge(page_routes)
        .merge(api_routes)
        .merge(webhook_routes)
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
