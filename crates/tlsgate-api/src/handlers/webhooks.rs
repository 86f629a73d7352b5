//! Webhook receiver

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::AppState;
use crate::webhook::{verify_signature, WebhookEvent, SIGNATURE_HEADER};

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
    pub event_type: String,
}

/// Verify, parse and dispatch a signed event.
///
/// The signature is checked over the raw body before anything is parsed.
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookAck>), ApiError> {
    let Some(secret) = state.webhook_secret.as_deref() else {
        warn!("Webhook rejected: no secret configured");
        return Err(ApiError::Unauthorized);
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            warn!("Webhook rejected: missing signature header");
            ApiError::Unauthorized
        })?;

    if !verify_signature(secret, &body, signature) {
        warn!("Webhook rejected: signature mismatch");
        return Err(ApiError::Unauthorized);
    }

    let event = WebhookEvent::parse(&body)?;
    debug!(event_type = %event.event_type, "Webhook accepted");

    state.dispatcher.dispatch(&event)?;

    Ok((
        StatusCode::OK,
        Json(WebhookAck {
            status: "ok",
            event_type: event.event_type,
        }),
    ))
}
