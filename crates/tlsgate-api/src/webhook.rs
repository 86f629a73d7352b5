//! Signed webhook events
//!
//! Events arrive as JSON with an `event_type` field and an
//! `X-Webhook-Signature: sha256=<hex>` header computed over the raw body.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use tlsgate_common::{Error, Result};
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
const SIGNATURE_PREFIX: &str = "sha256=";

pub const MESSAGE_RECEIVED: &str = "message.received";
pub const MESSAGE_DELIVERED: &str = "message.delivered";
pub const MESSAGE_BOUNCED: &str = "message.bounced";
pub const TLS_POLICY_VIOLATION: &str = "tls.policy_violation";

/// Compute the signature header value for `body`
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
}

/// Check a `sha256=<hex>` signature in constant time
pub fn verify_signature(secret: &[u8], body: &[u8], header: &str) -> bool {
    let Some(digest) = header.trim().strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };

    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// A parsed webhook event
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub event_type: String,
    pub payload: Value,
}

impl WebhookEvent {
    /// Parse the raw body. The body must be a JSON object with a string `event_type`.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let payload: Value = serde_json::from_slice(body)
            .map_err(|e| Error::Validation(format!("Invalid JSON payload: {}", e)))?;

        let event_type = payload
            .get("event_type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("Missing event_type".to_string()))?
            .to_string();

        Ok(Self {
            event_type,
            payload,
        })
    }

    fn field(&self, name: &str) -> &str {
        self.payload.get(name).and_then(Value::as_str).unwrap_or("-")
    }
}

/// Handles one kind of webhook event
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &WebhookEvent) -> Result<()>;
}

/// Logs message lifecycle events
struct MessageEventHandler {
    action: &'static str,
}

impl EventHandler for MessageEventHandler {
    fn handle(&self, event: &WebhookEvent) -> Result<()> {
        info!(
            event_type = %event.event_type,
            message_id = event.field("message_id"),
            "Message {}",
            self.action
        );
        Ok(())
    }
}

/// Reports TLS policy violations observed by a peer MTA
struct PolicyViolationHandler;

impl EventHandler for PolicyViolationHandler {
    fn handle(&self, event: &WebhookEvent) -> Result<()> {
        warn!(
            remote = event.field("remote"),
            reason = event.field("reason"),
            "TLS policy violation reported"
        );
        Ok(())
    }
}

struct UnknownEventHandler;

impl EventHandler for UnknownEventHandler {
    fn handle(&self, event: &WebhookEvent) -> Result<()> {
        debug!(event_type = %event.event_type, "Unhandled webhook event");
        Ok(())
    }
}

/// Routes events to handlers by `event_type`
pub struct EventDispatcher {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
    unknown: Arc<dyn EventHandler>,
}

impl EventDispatcher {
    /// Dispatcher with no named handlers
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
            unknown: Arc::new(UnknownEventHandler),
        }
    }

    /// Dispatcher with the built-in handler set
    pub fn new() -> Self {
        let mut dispatcher = Self::empty();
        dispatcher.register(MESSAGE_RECEIVED, Arc::new(MessageEventHandler { action: "received" }));
        dispatcher.register(MESSAGE_DELIVERED, Arc::new(MessageEventHandler { action: "delivered" }));
        dispatcher.register(MESSAGE_BOUNCED, Arc::new(MessageEventHandler { action: "bounced" }));
        dispatcher.register(TLS_POLICY_VIOLATION, Arc::new(PolicyViolationHandler));
        dispatcher
    }

    pub fn register(&mut self, event_type: &str, handler: Arc<dyn EventHandler>) {
        self.handlers.insert(event_type.to_string(), handler);
    }

    pub fn is_registered(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    pub fn dispatch(&self, event: &WebhookEvent) -> Result<()> {
        let handler = self
            .handlers
            .get(&event.event_type)
            .unwrap_or(&self.unknown);

        handler.handle(event).map_err(|e| match e {
            Error::Webhook(_) => e,
            other => Error::Webhook(other.to_string()),
        })
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
