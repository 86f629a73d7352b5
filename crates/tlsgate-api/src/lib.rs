//! tlsgate API - HTTP surface of the sidecar
//!
//! Serves the signed webhook receiver along with health and Prometheus
//! metrics endpoints for the enforcement engine.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod webhook;

pub use routes::create_router;
pub use state::AppState;
pub use webhook::{EventDispatcher, EventHandler, WebhookEvent};
