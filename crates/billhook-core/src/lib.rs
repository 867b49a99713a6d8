//! Shared types for the billhook pipeline.
//!
//! Holds the inbound event model and the job-queue seam so the ingress
//! and worker crates can depend on the same contracts without depending
//! on each other.

pub mod event;
pub mod queue;

pub use event::InboundEvent;
pub use queue::{JobQueue, QueueError};
