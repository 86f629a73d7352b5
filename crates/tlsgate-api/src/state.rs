//! Shared application state

use std::sync::Arc;
use tlsgate_core::{EnforcementMetrics, PolicyStore};

use crate::webhook::EventDispatcher;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<PolicyStore>,
    pub metrics: Arc<EnforcementMetrics>,
    /// Shared HMAC secret for webhook signatures
    pub webhook_secret: Option<Arc<[u8]>>,
    pub dispatcher: Arc<EventDispatcher>,
}

impl AppState {
    pub fn new(store: Arc<PolicyStore>, metrics: Arc<EnforcementMetrics>) -> Self {
        Self {
            store,
            metrics,
            webhook_secret: None,
            dispatcher: Arc::new(EventDispatcher::new()),
        }
    }

    pub fn with_webhook_secret(mut self, secret: impl AsRef<[u8]>) -> Self {
        self.webhook_secret = Some(Arc::from(secret.as_ref()));
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: EventDispatcher) -> Self {
        self.dispatcher = Arc::new(dispatcher);
        self
    }
}
