//! Axum router setup for the ingress endpoints.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use billhook_core::queue::JobQueue;

use crate::handlers;

/// Shared state for the ingress handlers.
#[derive(Clone)]
pub struct IngressState {
    /// Shared secret for signature verification.
    pub secret: Arc<str>,
    /// Durable queue the gate hands events to.
    pub queue: Arc<dyn JobQueue>,
}

impl IngressState {
    /// Create ingress state from the shared secret and queue handle.
    pub fn new(secret: impl Into<Arc<str>>, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            secret: secret.into(),
            queue,
        }
    }
}

/// Build the ingress router.
pub fn ingress_router(state: IngressState) -> Router {
    Router::new()
        .route("/webhook/crm", post(handlers::receive_webhook))
        .route("/health", get(handlers::health))
        .with_state(state)
}
