//! CRM authentication — `OAuth2` client credentials with a cached,
//! single-flight-refreshed bearer token.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::{ApiError, ApiResult};

/// A token is considered expiring this long before its actual expiry,
/// so a token handed to a caller is always valid for at least this
/// margin at hand-out time.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Fallback lifetime when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Ceiling on the advertised token lifetime. `expires_in` is untrusted
/// remote input; a huge value would overflow the `Instant` arithmetic
/// in the expiry computation, and a cached token should be re-checked
/// within a day regardless of what the endpoint claims.
const MAX_EXPIRES_IN_SECS: u64 = 86_400;

/// `OAuth2` client-credentials configuration for the CRM.
#[derive(Clone)]
pub struct OAuthConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Token response from the credential exchange endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Cached bearer token with expiry.
#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    /// Valid for at least the safety margin from now.
    fn is_fresh(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN < self.expires_at
    }
}

/// Owns the cached CRM credential and serializes refreshes.
///
/// Reads of a still-valid token take only a read lock. When the token
/// is absent or expiring, refreshes are coalesced: concurrent callers
/// queue on the refresh mutex and re-check the cache before exchanging,
/// so exactly one outbound credential exchange happens per refresh
/// cycle no matter how many jobs need a token at once.
pub struct TokenManager {
    config: OAuthConfig,
    http_client: reqwest::Client,
    cache: RwLock<Option<CachedToken>>,
    refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("config", &self.config)
            .finish()
    }
}

impl TokenManager {
    /// Create a token manager sharing the given HTTP client.
    #[must_use]
    pub fn new(config: OAuthConfig, http_client: reqwest::Client) -> Arc<Self> {
        Arc::new(Self {
            config,
            http_client,
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Get a bearer token valid for at least the safety margin.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Auth`] if the credential exchange fails.
    /// A failed exchange is never cached; the next call starts a fresh
    /// exchange from scratch.
    pub async fn token(&self) -> ApiResult<String> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_fresh() {
                    return Ok(cached.value.clone());
                }
            }
        }

        // Single-flight: whoever holds this lock does the exchange;
        // everyone else re-checks the cache once they get through.
        let _guard = self.refresh_lock.lock().await;

        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_fresh() {
                    return Ok(cached.value.clone());
                }
            }
        }

        debug!(token_url = %self.config.token_url, "Refreshing CRM access token");
        let token = self.exchange().await?;

        let value = token.value.clone();
        {
            let mut cache = self.cache.write().await;
            *cache = Some(token);
        }

        Ok(value)
    }

    /// Drop the cached token if it still holds `stale`.
    ///
    /// Called when the API rejects a token with 401. The value check
    /// makes concurrent reporters of the same stale token idempotent:
    /// once one of them clears the cache (or a refresh has replaced
    /// it), the rest are no-ops, so at most one refresh follows.
    pub async fn invalidate(&self, stale: &str) {
        let mut cache = self.cache.write().await;
        if cache.as_ref().is_some_and(|c| c.value == stale) {
            debug!("Invalidating rejected CRM access token");
            *cache = None;
        }
    }

    /// Perform one client-credentials exchange. No retry here; retry
    /// is the calling client's responsibility.
    async fn exchange(&self) -> ApiResult<CachedToken> {
        let form = [("grant_type", "client_credentials")];

        let response = self
            .http_client
            .post(&self.config.token_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&form)
            .send()
            .await
            .map_err(|e| ApiError::Auth(format!("Token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(ApiError::Auth(format!(
                "Token endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Auth(format!("Failed to parse token response: {e}")))?;

        let expires_in = token
            .expires_in
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS)
            .min(MAX_EXPIRES_IN_SECS);

        Ok(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(expires_in),
        })
    }
}
