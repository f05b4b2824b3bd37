//! Background job service for deferred commands.
//!
//! ## Design
//!
//! A job carries a [`CommandEnvelope`]: the command's registered name plus
//! the raw attributes it was called with. Failed attempts are retried on the
//! job's [`RetryPolicy`] and parked in the dead-letter queue once it runs
//! out. A command that refuses to run at execution time cancels its job,
//! which is never retried.
//!
//! ## Components
//!
//! - `JobScheduler`: the submit / submit-at contract callers use
//! - `JobStore`: persistence for jobs (in-memory here)
//! - `JobExecutor`: claims jobs, routes them by command name, retries

pub mod executor;
pub mod scheduler;
pub mod store;
pub mod types;

pub use executor::{ExecutorStats, JobExecutor, JobExecutorConfig, JobExecutorHandle, JobHandler};
pub use scheduler::{JobScheduler, SchedulerError, StoreScheduler};
pub use store::{InMemoryJobStore, JobFilter, JobStats, JobStore, JobStoreError};
pub use types::{
    Attempt, AttemptResult, Backoff, CommandEnvelope, DeadLetter, Delay, Job, JobId, JobResult, JobStatus, RetryPolicy,
};
