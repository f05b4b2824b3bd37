//! Where jobs live between submission and completion.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;

use super::types::{DeadLetter, Job, JobId, JobStatus};

/// Selects jobs for [`JobStore::list`]. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    /// State name as returned by [`JobStatus::name`].
    pub status: Option<&'static str>,
    pub command: Option<String>,
    pub queue: Option<String>,
}

impl JobFilter {
    pub fn status(mut self, status: &JobStatus) -> Self {
        self.status = Some(status.name());
        self
    }

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.status.is_none_or(|s| job.status.name() == s)
            && self.command.as_deref().is_none_or(|c| job.command() == c)
            && self.queue.as_deref().is_none_or(|q| job.queue == q)
    }
}

/// Persistence for jobs and the dead-letter queue.
pub trait JobStore: Send + Sync {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Overwrite a stored job with `job`.
    fn save(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Atomically pick the oldest due job, optionally from one queue, and
    /// mark it running.
    fn claim_next(&self, queue: Option<&str>) -> Result<Option<Job>, JobStoreError>;

    /// Matching jobs, oldest first.
    fn list(&self, filter: &JobFilter, limit: usize) -> Result<Vec<Job>, JobStoreError>;

    /// Remove a job from the live set and park it.
    fn bury(&self, job: Job, reason: String) -> Result<(), JobStoreError>;

    /// Parked jobs, oldest first.
    fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, JobStoreError>;

    /// Put a parked job back in line with a clean slate.
    fn revive(&self, id: JobId) -> Result<Job, JobStoreError>;

    fn discard(&self, id: JobId) -> Result<(), JobStoreError>;

    fn stats(&self) -> Result<JobStats, JobStoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

impl<T> From<PoisonError<T>> for JobStoreError {
    fn from(_: PoisonError<T>) -> Self {
        JobStoreError::Storage("job store lock poisoned".to_string())
    }
}

/// Count of jobs per state. Buried jobs count as `dead_lettered`.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub retrying: usize,
    pub dead_lettered: usize,
    pub cancelled: usize,
}

impl JobStats {
    fn count(&mut self, status: &JobStatus) {
        let slot = match status {
            JobStatus::Pending => &mut self.pending,
            JobStatus::Running => &mut self.running,
            JobStatus::Completed => &mut self.completed,
            JobStatus::Retrying { .. } => &mut self.retrying,
            JobStatus::DeadLettered { .. } => &mut self.dead_lettered,
            JobStatus::Cancelled { .. } => &mut self.cancelled,
        };
        *slot += 1;
    }
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    live: RwLock<HashMap<JobId, Job>>,
    buried: RwLock<HashMap<JobId, DeadLetter>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

fn oldest_first<T, K: Ord>(mut items: Vec<T>, limit: usize, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by_key(key);
    items.truncate(limit);
    items
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut live = self.live.write()?;
        if live.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        live.insert(id, job);
        Ok(id)
    }

    fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        Ok(self.live.read()?.get(&id).cloned())
    }

    fn save(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut live = self.live.write()?;
        let slot = live.get_mut(&job.id).ok_or(JobStoreError::NotFound(job.id))?;
        *slot = job.clone();
        Ok(())
    }

    fn claim_next(&self, queue: Option<&str>) -> Result<Option<Job>, JobStoreError> {
        let now = Utc::now();
        let mut live = self.live.write()?;

        let next = live
            .values_mut()
            .filter(|j| j.is_due(now) && queue.is_none_or(|q| j.queue == q))
            .min_by_key(|j| (j.created_at, j.id));

        Ok(next.map(|job| {
            job.start();
            job.clone()
        }))
    }

    fn list(&self, filter: &JobFilter, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        let live = self.live.read()?;
        let matching = live.values().filter(|j| filter.matches(j)).cloned().collect();
        Ok(oldest_first(matching, limit, |j: &Job| (j.created_at, j.id)))
    }

    fn bury(&self, job: Job, reason: String) -> Result<(), JobStoreError> {
        let mut live = self.live.write()?;
        let mut buried = self.buried.write()?;

        live.remove(&job.id);
        buried.insert(
            job.id,
            DeadLetter {
                job,
                reason,
                at: Utc::now(),
            },
        );
        Ok(())
    }

    fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, JobStoreError> {
        let entries = self.buried.read()?.values().cloned().collect();
        Ok(oldest_first(entries, limit, |e: &DeadLetter| e.at))
    }

    fn revive(&self, id: JobId) -> Result<Job, JobStoreError> {
        let mut live = self.live.write()?;
        let mut buried = self.buried.write()?;

        let mut job = buried.remove(&id).ok_or(JobStoreError::NotFound(id))?.job;
        job.reset();
        live.insert(job.id, job.clone());
        Ok(job)
    }

    fn discard(&self, id: JobId) -> Result<(), JobStoreError> {
        self.buried
            .write()?
            .remove(&id)
            .map(drop)
            .ok_or(JobStoreError::NotFound(id))
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        let mut stats = JobStats::default();
        for job in self.live.read()?.values() {
            stats.count(&job.status);
        }
        stats.dead_lettered += self.buried.read()?.len();
        Ok(stats)
    }
}

impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).enqueue(job)
    }

    fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(id)
    }

    fn save(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).save(job)
    }

    fn claim_next(&self, queue: Option<&str>) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next(queue)
    }

    fn list(&self, filter: &JobFilter, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        (**self).list(filter, limit)
    }

    fn bury(&self, job: Job, reason: String) -> Result<(), JobStoreError> {
        (**self).bury(job, reason)
    }

    fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, JobStoreError> {
        (**self).dead_letters(limit)
    }

    fn revive(&self, id: JobId) -> Result<Job, JobStoreError> {
        (**self).revive(id)
    }

    fn discard(&self, id: JobId) -> Result<(), JobStoreError> {
        (**self).discard(id)
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        (**self).stats()
    }
}
