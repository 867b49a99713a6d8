//! Asynchronous processing side of billhook.
//!
//! An in-process at-least-once job queue, a bounded-concurrency worker
//! pool with graceful shutdown, and the event processor that turns a
//! webhook notification into at most one invoice creation.

pub mod error;
pub mod processor;
pub mod queue;
pub mod worker;

pub use error::ProcessError;
pub use processor::{EventProcessor, JobProcessor, Outcome, SkipReason, TriggerConfig};
pub use queue::{Job, JobRecord, MemoryQueue, QueueStats};
pub use worker::{Worker, WorkerConfig};
