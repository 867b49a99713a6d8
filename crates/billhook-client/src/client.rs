//! Authenticated CRM HTTP client (reqwest-based).
//!
//! Wraps `reqwest::Client` with bearer-token injection, forced token
//! refresh on 401, and bounded retry with backoff. Shared by all
//! concurrently running jobs; the only mutable state behind it is the
//! token cache inside [`TokenManager`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::auth::TokenManager;
use crate::error::{ApiError, ApiResult};
use crate::models::{CreatedInvoice, Estimate, InvoiceDraft, LinkInvoice};
use crate::retry::RetryPolicy;

/// Default per-request timeout. A stuck remote call must not hold a
/// worker slot indefinitely.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// CRM API client used by the worker's jobs.
#[derive(Clone)]
pub struct CrmClient {
    base_url: String,
    http_client: Client,
    auth: Arc<TokenManager>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for CrmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmClient")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish()
    }
}

impl CrmClient {
    /// Create a client against the given CRM base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidConfig`] if the HTTP client cannot be
    /// built.
    pub fn new(
        base_url: impl Into<String>,
        auth: Arc<TokenManager>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> ApiResult<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent("billhook/0.1")
            .build()
            .map_err(|e| ApiError::InvalidConfig(format!("Failed to build HTTP client: {e}")))?;

        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Ok(Self {
            base_url,
            http_client,
            auth,
            retry,
        })
    }

    /// Fetch an estimate by id. Never cached — each job re-reads the
    /// authoritative status.
    pub async fn get_estimate(&self, id: &str) -> ApiResult<Estimate> {
        self.request_json(Method::GET, &format!("/estimates/{id}"), None::<&()>)
            .await
    }

    /// Create an invoice from the given draft.
    pub async fn create_invoice(&self, draft: &InvoiceDraft) -> ApiResult<CreatedInvoice> {
        self.request_json(Method::POST, "/invoices", Some(draft))
            .await
    }

    /// Write the created invoice's id back onto the source estimate.
    ///
    /// Callers treat this as best effort; the error is returned so the
    /// call site can log and swallow it.
    pub async fn link_invoice(&self, estimate_id: &str, invoice_id: &str) -> ApiResult<()> {
        let body = LinkInvoice {
            linked_invoice_id: invoice_id,
        };
        self.request_no_content(Method::PATCH, &format!("/estimates/{estimate_id}"), Some(&body))
            .await
    }

    /// Issue a request under the retry policy and decode the JSON body.
    async fn request_json<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> ApiResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.request_raw(method, path, body).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(format!("{path}: {e}")))
    }

    /// Issue a request under the retry policy, discarding the body.
    async fn request_no_content<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ApiResult<()>
    where
        B: Serialize + ?Sized,
    {
        self.request_raw(method, path, body).await.map(|_| ())
    }

    /// Run one logical request through the shared retry policy.
    async fn request_raw<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ApiResult<reqwest::Response>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let url_ref = url.as_str();
        self.retry
            .execute(path, move || self.attempt(method.clone(), url_ref, body))
            .await
    }

    /// One attempt: token, send, classify the response.
    async fn attempt<B>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> ApiResult<reqwest::Response>
    where
        B: Serialize + ?Sized,
    {
        let token = self.auth.token().await?;

        let mut request = self
            .http_client
            .request(method, url)
            .bearer_auth(&token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            // The next attempt will exchange fresh credentials; the
            // invalidation is value-checked so concurrent 401s cause at
            // most one refresh.
            warn!(url, "CRM rejected bearer token, forcing refresh");
            self.auth.invalidate(&token).await;
            return Err(ApiError::Unauthorized);
        }

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            debug!(url, status = status.as_u16(), "CRM returned error status");
            return Err(ApiError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}
