//! Job processing errors.

use billhook_client::ApiError;

/// Errors raised while processing a queued webhook event.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// A required reference is missing from the source resource (e.g.,
    /// an accepted estimate with no customer relation). Retrying will
    /// not conjure the missing data, so the job fails outright.
    #[error("Missing required reference: {0}")]
    MissingReference(String),

    /// The queued payload is not a usable event.
    #[error("Invalid job payload: {0}")]
    InvalidPayload(String),

    /// The CRM API call failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ProcessError {
    /// Whether the queue should redeliver the job.
    ///
    /// API-level exhaustion stays retryable here: the client's bounded
    /// attempts cover a single call, and the queue's own attempt budget
    /// covers the job as a whole.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            ProcessError::MissingReference(_) | ProcessError::InvalidPayload(_) => false,
            ProcessError::Api(e) => {
                matches!(e, ApiError::RetriesExhausted { .. }) || e.is_retryable()
            }
        }
    }
}
