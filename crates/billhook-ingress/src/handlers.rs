//! Webhook receive handler — the latency-critical fast path.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use tracing::{debug, error, warn};

use billhook_core::event::{InboundEvent, WEBHOOK_JOB_NAME};

use crate::crypto;
use crate::router::IngressState;

/// Header carrying the provider's payload signature.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Accept a signed webhook notification.
///
/// The provider penalizes slow or erroring receivers, so this handler
/// does exactly three things: verify the signature over the raw bytes,
/// enqueue, respond. Signature failure is the only rejection; once a
/// payload is authenticated, every internal fault (unparseable body,
/// queue unavailable) is logged and hidden behind a `200` so transient
/// trouble on our side never causes the provider to suspend delivery.
/// The cost is that a failed queue write silently drops the event —
/// the `error` log line is the only trace of it.
pub async fn receive_webhook(
    State(state): State<IngressState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let provided = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    if !crypto::verify_signature(provided, &state.secret, &body) {
        warn!(
            target: "webhook_ingress",
            body_len = body.len(),
            "Rejected webhook: signature verification failed"
        );
        return StatusCode::UNAUTHORIZED;
    }

    let event: InboundEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            error!(
                target: "webhook_ingress",
                error = %e,
                "Authenticated webhook body is not a valid event; dropping"
            );
            return StatusCode::OK;
        }
    };

    let payload = match serde_json::to_value(&event) {
        Ok(payload) => payload,
        Err(e) => {
            error!(target: "webhook_ingress", error = %e, "Failed to serialize event for enqueue");
            return StatusCode::OK;
        }
    };

    match state.queue.enqueue(WEBHOOK_JOB_NAME, payload).await {
        Ok(job_id) => {
            debug!(
                target: "webhook_ingress",
                %job_id,
                event_type = %event.event_type,
                related_type = %event.related_type,
                "Webhook accepted and enqueued"
            );
        }
        Err(e) => {
            error!(
                target: "webhook_ingress",
                error = %e,
                event_type = %event.event_type,
                "Queue write failed; event dropped after acknowledging"
            );
        }
    }

    StatusCode::OK
}

/// Liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
