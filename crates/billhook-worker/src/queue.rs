//! In-process at-least-once job queue.
//!
//! Stands in for an external durable queue behind the same
//! [`JobQueue`] seam: fire-and-forget enqueue, per-job retry via
//! delayed re-enqueue, and bounded retention of recently finished job
//! records for inspection. Delivery order is not guaranteed once
//! retries are in play, and consumers must tolerate redelivery.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;
use uuid::Uuid;

use billhook_core::queue::{JobQueue, QueueError};

/// One queued unit of work wrapping exactly one event payload.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    pub payload: serde_json::Value,
    /// 1-based delivery attempt.
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    /// The same job, one attempt later. Keeps the original id so
    /// retries are traceable as redeliveries, not new jobs.
    #[must_use]
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}

/// Record of a finished (completed or failed) job.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: Uuid,
    pub name: String,
    pub attempts: u32,
    pub finished_at: DateTime<Utc>,
    /// Outcome description on success, error text on failure.
    pub disposition: String,
}

/// Counters exposed for operational visibility.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
}

struct QueueInner {
    retention: usize,
    completed: Mutex<VecDeque<JobRecord>>,
    failed: Mutex<VecDeque<JobRecord>>,
    enqueued_count: AtomicU64,
    completed_count: AtomicU64,
    failed_count: AtomicU64,
}

impl QueueInner {
    fn push_bounded(&self, target: &Mutex<VecDeque<JobRecord>>, record: JobRecord) {
        let mut records = target.lock().expect("queue record lock poisoned");
        while records.len() >= self.retention.max(1) {
            records.pop_front();
        }
        records.push_back(record);
    }
}

/// In-process queue handle. Cheap to clone; all clones feed the same
/// worker.
#[derive(Clone)]
pub struct MemoryQueue {
    tx: UnboundedSender<Job>,
    inner: Arc<QueueInner>,
}

impl MemoryQueue {
    /// Create a queue keeping the `retention` most recent completed and
    /// failed records. Returns the handle and the receiver the worker
    /// consumes.
    #[must_use]
    pub fn new(retention: usize) -> (Self, UnboundedReceiver<Job>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Self {
            tx,
            inner: Arc::new(QueueInner {
                retention,
                completed: Mutex::new(VecDeque::new()),
                failed: Mutex::new(VecDeque::new()),
                enqueued_count: AtomicU64::new(0),
                completed_count: AtomicU64::new(0),
                failed_count: AtomicU64::new(0),
            }),
        };
        (queue, rx)
    }

    /// Put a job back for redelivery. Used by the worker's retry path.
    pub fn requeue(&self, job: Job) -> Result<(), QueueError> {
        debug!(job_id = %job.id, attempt = job.attempt, "Re-enqueueing job for retry");
        self.tx
            .send(job)
            .map_err(|_| QueueError::Unavailable("queue receiver dropped".into()))
    }

    /// Record a successfully finished job.
    pub fn record_completed(&self, job: &Job, disposition: String) {
        self.inner.completed_count.fetch_add(1, Ordering::Relaxed);
        self.inner.push_bounded(
            &self.inner.completed,
            JobRecord {
                id: job.id,
                name: job.name.clone(),
                attempts: job.attempt,
                finished_at: Utc::now(),
                disposition,
            },
        );
    }

    /// Record a job that failed for good (terminal error or spent
    /// attempt budget).
    pub fn record_failed(&self, job: &Job, disposition: String) {
        self.inner.failed_count.fetch_add(1, Ordering::Relaxed);
        self.inner.push_bounded(
            &self.inner.failed,
            JobRecord {
                id: job.id,
                name: job.name.clone(),
                attempts: job.attempt,
                finished_at: Utc::now(),
                disposition,
            },
        );
    }

    /// Retained records of recently completed jobs, oldest first.
    #[must_use]
    pub fn recent_completed(&self) -> Vec<JobRecord> {
        self.inner
            .completed
            .lock()
            .expect("queue record lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Retained records of recently failed jobs, oldest first.
    #[must_use]
    pub fn recent_failed(&self) -> Vec<JobRecord> {
        self.inner
            .failed
            .lock()
            .expect("queue record lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Lifetime counters.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.inner.enqueued_count.load(Ordering::Relaxed),
            completed: self.inner.completed_count.load(Ordering::Relaxed),
            failed: self.inner.failed_count.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(
        &self,
        job_name: &str,
        payload: serde_json::Value,
    ) -> Result<Uuid, QueueError> {
        let job = Job {
            id: Uuid::new_v4(),
            name: job_name.to_string(),
            payload,
            attempt: 1,
            enqueued_at: Utc::now(),
        };
        let id = job.id;

        self.tx
            .send(job)
            .map_err(|_| QueueError::Unavailable("queue receiver dropped".into()))?;

        self.inner.enqueued_count.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }
}
