//! Authenticated, retrying client for the CRM's REST API.
//!
//! Combines an `OAuth2` client-credentials token manager (cached,
//! single-flight refresh), a shared retry-with-backoff policy, and
//! typed estimate/invoice operations.

pub mod auth;
pub mod client;
pub mod error;
pub mod models;
pub mod retry;

pub use auth::{OAuthConfig, TokenManager};
pub use client::CrmClient;
pub use error::{ApiError, ApiResult};
pub use retry::RetryPolicy;
