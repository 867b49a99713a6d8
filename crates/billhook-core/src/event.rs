//! Inbound webhook event model.

use serde::{Deserialize, Serialize};

/// Job name under which webhook events are enqueued.
pub const WEBHOOK_JOB_NAME: &str = "crm_webhook_event";

/// A webhook notification as sent by the CRM provider.
///
/// Immutable once received. The signature is verified against the raw
/// request bytes before this struct exists, so it carries no signature
/// material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Provider event name (e.g., `docslog` for document log entries).
    #[serde(rename = "event")]
    pub event_type: String,

    /// Type of the object the event refers to (e.g., `estimate`).
    #[serde(rename = "relatedtype")]
    pub related_type: String,

    /// Partial snapshot of the related object. Treated as opaque and
    /// eventually stale; only the id is read from it.
    #[serde(rename = "relatedobject", default)]
    pub related_object: serde_json::Value,
}

impl InboundEvent {
    /// Extract the id of the related object.
    ///
    /// The provider sends ids as either strings or integers depending
    /// on the endpoint; both are normalized to `String`. Returns `None`
    /// when no usable id is present.
    #[must_use]
    pub fn related_id(&self) -> Option<String> {
        match self.related_object.get("id") {
            Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }
}
