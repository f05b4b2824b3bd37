//! The two-call scheduling contract deferred commands are submitted through.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use super::store::{JobStore, JobStoreError};
use super::types::{CommandEnvelope, Delay, Job, JobId, RetryPolicy};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] JobStoreError),

    #[error("scheduler rejected job: {0}")]
    Rejected(String),
}

/// Hands command envelopes to a background job service.
///
/// The service owns serialization, retry and eventual invocation of the
/// reconstructed command.
pub trait JobScheduler: Send + Sync {
    /// Enqueue for execution as soon as possible.
    fn submit(&self, envelope: CommandEnvelope) -> Result<JobId, SchedulerError>;

    /// Enqueue for execution after a delay or at an absolute time.
    fn submit_at(&self, envelope: CommandEnvelope, delay: Delay) -> Result<JobId, SchedulerError>;
}

impl<S: JobScheduler + ?Sized> JobScheduler for Arc<S> {
    fn submit(&self, envelope: CommandEnvelope) -> Result<JobId, SchedulerError> {
        (**self).submit(envelope)
    }

    fn submit_at(&self, envelope: CommandEnvelope, delay: Delay) -> Result<JobId, SchedulerError> {
        (**self).submit_at(envelope, delay)
    }
}

impl<S: JobScheduler + ?Sized> JobScheduler for &S {
    fn submit(&self, envelope: CommandEnvelope) -> Result<JobId, SchedulerError> {
        (**self).submit(envelope)
    }

    fn submit_at(&self, envelope: CommandEnvelope, delay: Delay) -> Result<JobId, SchedulerError> {
        (**self).submit_at(envelope, delay)
    }
}

/// Scheduler that enqueues jobs into a [`JobStore`] for a
/// [`JobExecutor`](super::JobExecutor) to pick up.
#[derive(Debug, Clone)]
pub struct StoreScheduler<S> {
    store: S,
    queue: String,
    retry_policy: RetryPolicy,
}

impl<S: JobStore> StoreScheduler<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            queue: "default".to_string(),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn enqueue(&self, job: Job) -> Result<JobId, SchedulerError> {
        let command = job.envelope.command.clone();
        let run_at = job.run_at;
        let id = self.store.enqueue(job.with_retry(self.retry_policy))?;
        info!(job_id = %id, %command, queue = %self.queue, ?run_at, "command scheduled");
        Ok(id)
    }
}

impl<S: JobStore> JobScheduler for StoreScheduler<S> {
    fn submit(&self, envelope: CommandEnvelope) -> Result<JobId, SchedulerError> {
        self.enqueue(Job::new(self.queue.clone(), envelope))
    }

    fn submit_at(&self, envelope: CommandEnvelope, delay: Delay) -> Result<JobId, SchedulerError> {
        self.enqueue(Job::new(self.queue.clone(), envelope).delayed(delay))
    }
}
