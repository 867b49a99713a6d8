//! Job queue seam between the ingress gate and the worker.

use async_trait::async_trait;
use uuid::Uuid;

/// Errors that can occur when handing a job to the queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The queue refused or failed to accept the job.
    #[error("Queue unavailable: {0}")]
    Unavailable(String),

    /// The job payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// An at-least-once job queue.
///
/// The gate only enqueues; delivery, retry, and cleanup policy belong
/// to the queue implementation. Consumers must tolerate duplicate
/// delivery of the same job.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job payload under the given job name.
    ///
    /// Returns the id assigned to the queued job.
    async fn enqueue(&self, job_name: &str, payload: serde_json::Value)
        -> Result<Uuid, QueueError>;
}
