use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, Notify};

use crate::error::AppError;
use crate::routes::SubmissionJob;

/// Channel carrying submission jobs from the intake handlers to the worker
/// pool. Delivery is at-least-once from the consumer's point of view: a
/// redelivered job must be tolerated by the worker (see the claim step in
/// `worker::process_job`), the queue itself makes no dedup effort.
pub struct JobQueue {
    queue: Mutex<VecDeque<SubmissionJob>>,
    notify: Notify,
    closed: AtomicBool,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueues a job. Fails once the queue has been closed for shutdown so
    /// intake can report the orphaned PENDING row instead of losing the job
    /// silently.
    pub async fn push(&self, job: SubmissionJob) -> Result<(), AppError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AppError::Queue("job queue is closed".to_string()));
        }
        self.queue.lock().await.push_back(job);
        self.notify.notify_one();
        Ok(())
    }

    pub async fn pop(&self) -> SubmissionJob {
        loop {
            if let Some(job) = self.queue.lock().await.pop_front() {
                return job;
            }
            self.notify.notified().await;
        }
    }

    /// Stops accepting new jobs; queued jobs can still be drained.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}
