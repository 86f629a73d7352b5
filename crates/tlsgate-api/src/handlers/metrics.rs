//! Prometheus exposition

use axum::{extract::State, http::header, response::IntoResponse};

use crate::error::ApiError;
use crate::state::AppState;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let body = state.metrics.render()?;
    Ok(([(header::CONTENT_TYPE, CONTENT_TYPE)], body))
}
