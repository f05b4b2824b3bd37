//! Worker that claims due jobs and runs them through registered handlers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::store::{JobStore, JobStoreError};
use super::types::{CommandEnvelope, Job, JobResult, JobStatus};

/// Runs one attempt of a job.
pub type JobHandler = Box<dyn Fn(&CommandEnvelope) -> JobResult + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct JobExecutorConfig {
    /// Sleep between polls of an empty queue
    pub poll_interval: Duration,
    /// Thread name, also used in logs
    pub name: String,
    /// Only claim jobs from this queue
    pub queue: Option<String>,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            name: "forgecmd-jobs".to_string(),
            queue: None,
        }
    }
}

impl JobExecutorConfig {
    /// Defaults overridden by `FORGECMD_JOB_POLL_MS`, `FORGECMD_JOB_QUEUE`
    /// and `FORGECMD_JOB_EXECUTOR_NAME`.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(ms) = var("FORGECMD_JOB_POLL_MS").and_then(|v| v.trim().parse::<u64>().ok()) {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(queue) = var("FORGECMD_JOB_QUEUE") {
            config.queue = Some(queue).filter(|q| !q.trim().is_empty());
        }
        if let Some(name) = var("FORGECMD_JOB_EXECUTOR_NAME").filter(|n| !n.trim().is_empty()) {
            config.name = name;
        }
        config
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Counters kept by a spawned executor.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExecutorStats {
    pub attempts: u64,
    pub completed: u64,
    pub retried: u64,
    pub cancelled: u64,
    pub dead_lettered: u64,
    pub claim_errors: u64,
}

impl ExecutorStats {
    fn record(&mut self, status: &JobStatus) {
        self.attempts += 1;
        match status {
            JobStatus::Completed => self.completed += 1,
            JobStatus::Retrying { .. } => self.retried += 1,
            JobStatus::Cancelled { .. } => self.cancelled += 1,
            JobStatus::DeadLettered { .. } => self.dead_lettered += 1,
            JobStatus::Pending | JobStatus::Running => {}
        }
    }
}

/// Handle to a spawned executor thread.
#[derive(Debug)]
pub struct JobExecutorHandle {
    stop: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<ExecutorStats>>,
}

impl JobExecutorHandle {
    /// Stop after the current attempt and wait for the thread.
    pub fn shutdown(mut self) {
        let _ = self.stop.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }

    pub fn stats(&self) -> ExecutorStats {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Claims due jobs from a store and routes each to the handler registered
/// for its command name.
///
/// ## Routing
///
/// ```text
/// "posts.admin.purge"
///   1. exact        "posts.admin.purge"
///   2. family       "posts.admin.*"  (longest prefix wins over "posts.*")
///   3. catch-all    "*"
/// ```
///
/// A job with no route fails like any other attempt.
pub struct JobExecutor<S: JobStore> {
    store: S,
    handlers: HashMap<String, JobHandler>,
}

impl<S: JobStore + 'static> JobExecutor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` under an exact name, `prefix.*` or `*`.
    /// Re-registering a pattern replaces the previous handler.
    pub fn register_handler<F>(&mut self, pattern: impl Into<String>, handler: F)
    where
        F: Fn(&CommandEnvelope) -> JobResult + Send + Sync + 'static,
    {
        self.handlers.insert(pattern.into(), Box::new(handler));
    }

    pub fn has_handler(&self, command: &str) -> bool {
        self.route(command).is_some()
    }

    fn route(&self, command: &str) -> Option<&JobHandler> {
        if let Some(handler) = self.handlers.get(command) {
            return Some(handler);
        }

        self.handlers
            .iter()
            .filter_map(|(pattern, handler)| {
                let prefix = pattern.strip_suffix(".*")?;
                command
                    .strip_prefix(prefix)?
                    .starts_with('.')
                    .then_some((prefix.len(), handler))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, handler)| handler)
            .or_else(|| self.handlers.get("*"))
    }

    /// Claim and run one due job on the calling thread. Returns the job as
    /// left by the attempt, or `None` when nothing was due.
    pub fn run_next(&self, queue: Option<&str>) -> Result<Option<Job>, JobStoreError> {
        let Some(mut job) = self.store.claim_next(queue)? else {
            return Ok(None);
        };
        self.attempt(&mut job)?;
        Ok(Some(job))
    }

    /// Run one attempt of a claimed job and persist the result. Jobs whose
    /// retries are exhausted move to the dead-letter queue.
    pub fn attempt(&self, job: &mut Job) -> Result<(), JobStoreError> {
        let started_at = Utc::now();
        let result = match self.route(job.command()) {
            Some(handler) => handler(&job.envelope),
            None => {
                warn!(job_id = %job.id, command = %job.command(), "no handler for job");
                JobResult::Failure(format!("no handler for command `{}`", job.command()))
            }
        };

        job.settle(result, started_at);
        match &job.status {
            JobStatus::DeadLettered { error } => {
                warn!(job_id = %job.id, command = %job.command(), tries = job.tries, %error, "job dead-lettered");
                self.store.bury(job.clone(), error.clone())
            }
            JobStatus::Retrying { error } => {
                debug!(job_id = %job.id, tries = job.tries, run_at = ?job.run_at, %error, "job will retry");
                self.store.save(job)
            }
            status => {
                debug!(job_id = %job.id, status = status.name(), "job finished");
                self.store.save(job)
            }
        }
    }

    /// Run the executor on its own thread until the handle is shut down.
    pub fn spawn(self, config: JobExecutorConfig) -> std::io::Result<JobExecutorHandle>
    where
        S: Send,
    {
        let (stop, stopped) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(ExecutorStats::default()));
        let worker_stats = stats.clone();

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || self.poll(&config, &stopped, &worker_stats))?;

        Ok(JobExecutorHandle {
            stop,
            join: Some(join),
            stats,
        })
    }

    fn poll(&self, config: &JobExecutorConfig, stopped: &mpsc::Receiver<()>, stats: &Mutex<ExecutorStats>) {
        info!(executor = %config.name, queue = ?config.queue, "job executor started");
        let started = Instant::now();

        while stopped.try_recv().is_err() {
            let mut job = match self.store.claim_next(config.queue.as_deref()) {
                Ok(Some(job)) => job,
                Ok(None) => {
                    thread::sleep(config.poll_interval);
                    continue;
                }
                Err(e) => {
                    error!(executor = %config.name, error = %e, "failed to claim job");
                    stats.lock().unwrap_or_else(PoisonError::into_inner).claim_errors += 1;
                    thread::sleep(config.poll_interval);
                    continue;
                }
            };

            debug!(executor = %config.name, job_id = %job.id, command = %job.command(), "claimed job");
            if let Err(e) = self.attempt(&mut job) {
                error!(executor = %config.name, job_id = %job.id, error = %e, "failed to record job result");
            }
            stats.lock().unwrap_or_else(PoisonError::into_inner).record(&job.status);
        }

        info!(executor = %config.name, uptime_secs = started.elapsed().as_secs(), "job executor stopped");
    }
}
