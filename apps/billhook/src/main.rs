//! billhook — accepts signed CRM webhooks and turns accepted estimates
//! into invoices on a decoupled worker path.

mod config;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use billhook_client::{CrmClient, OAuthConfig, RetryPolicy, TokenManager};
use billhook_core::queue::JobQueue;
use billhook_ingress::{ingress_router, IngressState};
use billhook_worker::{EventProcessor, MemoryQueue, TriggerConfig, Worker, WorkerConfig};

use crate::config::AppConfig;

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,billhook=debug")),
        )
        .init();

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        std::process::exit(1);
    });

    tracing::info!(
        listen_addr = %config.listen_addr,
        crm_base_url = %config.crm_base_url,
        worker_concurrency = config.worker_concurrency,
        "starting billhook"
    );

    // Phase 1: construct the outbound side completely. The worker's
    // job handler must exist in full before any job can be delivered;
    // startup ordering is expressed as data dependencies, not timing.
    let http_client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .unwrap_or_else(|e| {
            eprintln!("HTTP client error: {e}");
            std::process::exit(1);
        });

    let auth = TokenManager::new(
        OAuthConfig {
            token_url: config.crm_token_url.clone(),
            client_id: config.crm_client_id.clone(),
            client_secret: config.crm_client_secret.clone(),
        },
        http_client,
    );

    let crm_client = CrmClient::new(
        config.crm_base_url.clone(),
        auth,
        RetryPolicy::new(config.api_max_retries, std::time::Duration::from_secs(1)),
        config.http_timeout,
    )
    .unwrap_or_else(|e| {
        eprintln!("CRM client error: {e}");
        std::process::exit(1);
    });

    let processor = Arc::new(EventProcessor::new(
        Arc::new(crm_client),
        TriggerConfig::default(),
    ));

    // Phase 2: queue, worker, then the listener.
    let (queue, job_rx) = MemoryQueue::new(config.queue_retention);
    let shutdown = CancellationToken::new();

    let worker = Worker::new(
        queue.clone(),
        processor,
        WorkerConfig {
            concurrency: config.worker_concurrency,
            max_attempts: config.job_max_attempts,
            retry_delay: config.job_retry_delay,
        },
        shutdown.clone(),
    );
    let worker_handle = tokio::spawn(worker.run(job_rx));

    let state = IngressState::new(
        config.webhook_secret.clone(),
        Arc::new(queue) as Arc<dyn JobQueue>,
    );
    let app = ingress_router(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Bind error on {}: {e}", config.listen_addr);
            std::process::exit(1);
        });

    tracing::info!(listen_addr = %config.listen_addr, "webhook listener ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .unwrap_or_else(|e| {
            eprintln!("Server error: {e}");
            std::process::exit(1);
        });

    // Listener is down; drain the worker before exiting.
    shutdown.cancel();
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "worker task panicked during shutdown");
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
    shutdown.cancel();
}
