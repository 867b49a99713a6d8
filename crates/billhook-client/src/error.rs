//! Error types for the CRM API client.

/// Errors from the CRM API client and token manager.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Token exchange failed (non-success status or malformed body).
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The API rejected the bearer token (HTTP 401). The stale token
    /// has already been invalidated when this is returned.
    #[error("Unauthorized: bearer token rejected")]
    Unauthorized,

    /// Non-success HTTP status with captured response body.
    #[error("API returned {status}: {body}")]
    Http { status: u16, body: String },

    /// Transport-level failure (connect, timeout, TLS).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body could not be decoded into the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Invalid client configuration (bad base URL, unbuildable client).
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),

    /// The retry budget was spent without a successful attempt.
    #[error("Request failed after {attempts} attempt(s): {message}")]
    RetriesExhausted { attempts: u32, message: String },
}

impl ApiError {
    /// Whether the error is worth another attempt.
    ///
    /// A 401 counts: the stale token was invalidated, so the next
    /// attempt runs with a freshly exchanged credential. Auth exchange
    /// failures are treated as transient per the same reasoning.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Unauthorized | ApiError::Network(_) | ApiError::Auth(_) => true,
            ApiError::Http { status, .. } => *status == 429 || self.is_server_error(),
            ApiError::Decode(_)
            | ApiError::InvalidConfig(_)
            | ApiError::RetriesExhausted { .. } => false,
        }
    }

    /// Whether the error is a server-side (5xx) HTTP error.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, ApiError::Http { status, .. } if (500..600).contains(status))
    }
}

/// Result alias for client operations.
pub type ApiResult<T> = Result<T, ApiError>;
