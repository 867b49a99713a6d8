//! Service configuration loading.

use std::net::SocketAddr;
use std::time::Duration;

/// Configuration errors surfaced at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Runtime configuration, sourced from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    /// Shared secret the provider signs webhook payloads with.
    pub webhook_secret: String,
    pub crm_base_url: String,
    pub crm_token_url: String,
    pub crm_client_id: String,
    pub crm_client_secret: String,
    pub http_timeout: Duration,
    pub worker_concurrency: usize,
    /// Retry budget inside the API client, per call.
    pub api_max_retries: u32,
    /// Delivery budget at the queue level, per job.
    pub job_max_attempts: u32,
    pub job_retry_delay: Duration,
    /// How many recent completed/failed job records to keep around.
    pub queue_retention: usize,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    ///
    /// Lets tests supply variables without mutating process-global
    /// environment state.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let listen_addr = reader("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("LISTEN_ADDR".into(), e.to_string()))?;

        let webhook_secret = require(&reader, "WEBHOOK_SECRET")?;
        let crm_base_url = require(&reader, "CRM_BASE_URL")?;
        let crm_token_url = reader("CRM_TOKEN_URL")
            .unwrap_or_else(|_| format!("{}/oauth/token", crm_base_url.trim_end_matches('/')));
        let crm_client_id = require(&reader, "CRM_CLIENT_ID")?;
        let crm_client_secret = require(&reader, "CRM_CLIENT_SECRET")?;

        let http_timeout = Duration::from_secs(parse_or(&reader, "HTTP_TIMEOUT_SECS", 10u64)?);
        let worker_concurrency: usize = parse_or(&reader, "WORKER_CONCURRENCY", 4)?;
        let api_max_retries: u32 = parse_or(&reader, "API_MAX_RETRIES", 3)?;
        let job_max_attempts: u32 = parse_or(&reader, "JOB_MAX_ATTEMPTS", 3)?;
        let job_retry_delay =
            Duration::from_secs(parse_or(&reader, "JOB_RETRY_DELAY_SECS", 5u64)?);
        let queue_retention: usize = parse_or(&reader, "QUEUE_RETENTION", 100)?;

        // A zero here would stall the worker pool or drop every job on
        // first failure; neither is a sane deployment.
        reject_zero("WORKER_CONCURRENCY", worker_concurrency as u64)?;
        reject_zero("JOB_MAX_ATTEMPTS", u64::from(job_max_attempts))?;

        Ok(Self {
            listen_addr,
            webhook_secret,
            crm_base_url,
            crm_token_url,
            crm_client_id,
            crm_client_secret,
            http_timeout,
            worker_concurrency,
            api_max_retries,
            job_max_attempts,
            job_retry_delay,
            queue_retention,
        })
    }
}

fn require<F>(reader: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    match reader(key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar(key.to_string())),
    }
}

/// Parse a variable directly into its target integer width, so an
/// out-of-range value is rejected instead of silently truncated.
fn parse_or<T, F>(reader: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    match reader(key) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn reject_zero(key: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be at least 1".to_string(),
        ));
    }
    Ok(())
}
