//! API routes

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tlsgate_common::Config;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::error::panic_response;
use crate::handlers::{health, metrics, webhooks};
use crate::state::AppState;

/// Create the API router
pub fn create_router(state: AppState, config: &Config) -> Router {
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness));

    let mut router = Router::new()
        .nest("/health", health_routes)
        .route("/metrics", get(metrics::metrics));

    if config.webhook.enabled {
        router = router.route("/webhooks", post(webhooks::receive));
    }

    router
        .layer(DefaultBodyLimit::max(config.api.max_body_bytes))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
