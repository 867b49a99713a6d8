//! HTTP-facing fast path for inbound CRM webhooks.
//!
//! Verifies payload signatures over the raw request bytes, hands
//! authenticated events to the job queue, and acknowledges within the
//! provider's latency budget. No business logic lives here.

pub mod crypto;
pub mod handlers;
pub mod router;

pub use handlers::SIGNATURE_HEADER;
pub use router::{ingress_router, IngressState};
