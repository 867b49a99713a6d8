//! Bounded-concurrency worker pool over the job queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::processor::JobProcessor;
use crate::queue::{Job, MemoryQueue};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of jobs processed concurrently.
    pub concurrency: usize,
    /// Maximum delivery attempts per job (initial + retries).
    pub max_attempts: u32,
    /// Base delay before redelivery; grows linearly with the attempt.
    pub retry_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// Consumes the queue and runs each job through the processor.
///
/// Jobs run independently; the only state they share sits behind the
/// CRM client (the token cache). Retryable failures under the attempt
/// budget are re-enqueued after a delay; everything else is recorded
/// as failed. No ordering is guaranteed across jobs.
pub struct Worker<P: JobProcessor> {
    queue: MemoryQueue,
    processor: Arc<P>,
    config: WorkerConfig,
    shutdown: CancellationToken,
}

impl<P: JobProcessor> Worker<P> {
    /// Create a worker. The processor must be fully constructed before
    /// the worker is started; the worker never initializes it lazily.
    pub fn new(
        queue: MemoryQueue,
        processor: Arc<P>,
        config: WorkerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            processor,
            config,
            shutdown,
        }
    }

    /// Run until the queue closes or shutdown is requested, then drain
    /// in-flight jobs. The receiver is handed back so jobs that were
    /// never pulled stay with the caller instead of dying with the
    /// worker.
    pub async fn run(self, mut rx: UnboundedReceiver<Job>) -> UnboundedReceiver<Job> {
        info!(
            concurrency = self.config.concurrency,
            max_attempts = self.config.max_attempts,
            "Starting webhook worker"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));

        loop {
            // Claim a slot before pulling a job: a shutdown that wins
            // either select has then taken nothing off the queue, so no
            // job is dropped between dequeue and dispatch.
            let permit = tokio::select! {
                () = self.shutdown.cancelled() => {
                    info!("Worker shutdown requested while waiting for a slot");
                    break;
                }
                permit = semaphore.clone().acquire_owned() => {
                    permit.expect("worker semaphore closed")
                }
            };

            let job = tokio::select! {
                () = self.shutdown.cancelled() => {
                    info!("Worker shutdown requested, stopping intake");
                    drop(permit);
                    break;
                }
                maybe_job = rx.recv() => match maybe_job {
                    Some(job) => job,
                    None => {
                        info!("Queue closed, stopping intake");
                        drop(permit);
                        break;
                    }
                },
            };

            let queue = self.queue.clone();
            let processor = Arc::clone(&self.processor);
            let config = self.config.clone();

            tokio::spawn(async move {
                run_job(&queue, processor.as_ref(), &config, job).await;
                drop(permit);
            });
        }

        // Wait for in-flight jobs to finish.
        info!("Waiting for in-flight jobs to complete...");
        let _ = semaphore.acquire_many(self.config.concurrency as u32).await;
        info!("Worker stopped");

        rx
    }
}

/// Process one delivery of a job and settle its fate.
async fn run_job<P: JobProcessor>(
    queue: &MemoryQueue,
    processor: &P,
    config: &WorkerConfig,
    job: Job,
) {
    debug!(job_id = %job.id, attempt = job.attempt, "Processing job");

    match processor.process(&job).await {
        Ok(outcome) => {
            info!(job_id = %job.id, attempt = job.attempt, outcome = %outcome, "Job completed");
            queue.record_completed(&job, outcome.to_string());
        }
        Err(e) if e.is_retryable() && job.attempt < config.max_attempts => {
            let delay = config.retry_delay * job.attempt;
            warn!(
                job_id = %job.id,
                attempt = job.attempt,
                max_attempts = config.max_attempts,
                delay_secs = delay.as_secs(),
                error = %e,
                "Job failed, scheduling redelivery"
            );

            let queue = queue.clone();
            let retry = job.next_attempt();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = queue.requeue(retry) {
                    error!(error = %e, "Failed to re-enqueue job for retry");
                }
            });
        }
        Err(e) => {
            error!(
                job_id = %job.id,
                attempt = job.attempt,
                retryable = e.is_retryable(),
                error = %e,
                "Job failed permanently"
            );
            queue.record_failed(&job, e.to_string());
        }
    }
}
