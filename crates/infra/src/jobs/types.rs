//! Jobs, their lifecycle and the retry schedule.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use forgecmd_core::AttributeMap;
pub use forgecmd_core::JobId;

/// What a deferred job carries: the command type's registered name plus the
/// raw attribute mapping the caller supplied.
///
/// The executing side rebuilds a fresh command from it, so the mapping must
/// round-trip through serialization unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub command: String,
    #[serde(default)]
    pub attributes: AttributeMap,
}

impl CommandEnvelope {
    pub fn new(command: impl Into<String>, attributes: AttributeMap) -> Self {
        Self {
            command: command.into(),
            attributes,
        }
    }
}

/// When a deferred job should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delay {
    /// Run after waiting this long.
    Wait(Duration),
    /// Run at (or after) this instant.
    Until(DateTime<Utc>),
}

impl Delay {
    /// Absolute execution time relative to `now`.
    pub fn run_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Delay::Wait(wait) => chrono::Duration::from_std(*wait)
                .ok()
                .and_then(|wait| now.checked_add_signed(wait))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            Delay::Until(at) => *at,
        }
    }
}

impl From<Duration> for Delay {
    fn from(wait: Duration) -> Self {
        Delay::Wait(wait)
    }
}

impl From<DateTime<Utc>> for Delay {
    fn from(at: DateTime<Utc>) -> Self {
        Delay::Until(at)
    }
}

/// Where a job is in its lifecycle.
///
/// ```text
/// Pending -> Running -> Completed
///               |  \--> Cancelled { reason }
///               v
///         Retrying { error } -> Running -> ...
///               |
///               v
///        DeadLettered { error }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    /// Last attempt failed; waiting for `run_at` before the next one.
    Retrying { error: String },
    /// Retry policy exhausted.
    DeadLettered { error: String },
    /// The command refused to run at execution time. Never retried.
    Cancelled { reason: String },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::DeadLettered { .. } | JobStatus::Cancelled { .. }
        )
    }

    /// Whether an executor may pick the job up (subject to `run_at`).
    pub fn is_claimable(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Retrying { .. })
    }

    /// Lowercase state name, as serialized.
    pub fn name(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Retrying { .. } => "retrying",
            JobStatus::DeadLettered { .. } => "dead_lettered",
            JobStatus::Cancelled { .. } => "cancelled",
        }
    }
}

/// Wait between a failed attempt and the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Same wait every time.
    Fixed(Duration),
    /// `step * failures`, capped.
    Linear { step: Duration, cap: Duration },
    /// `base * 2^(failures - 1)`, capped.
    Exponential { base: Duration, cap: Duration },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Exponential {
            base: Duration::from_millis(500),
            cap: Duration::from_secs(60),
        }
    }
}

impl Backoff {
    /// Wait after the `failures`-th consecutive failure (1-based).
    pub fn after(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        match *self {
            Backoff::Fixed(wait) => wait,
            Backoff::Linear { step, cap } => step.saturating_mul(failures).min(cap),
            Backoff::Exponential { base, cap } => {
                let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(cap)
            }
        }
    }
}

/// How many times a job may run and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    /// Run once, dead-letter on the first failure.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::Fixed(Duration::ZERO),
        }
    }

    pub fn fixed(max_attempts: u32, wait: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(wait),
        }
    }

    pub fn exponential(max_attempts: u32, base: Duration, cap: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential { base, cap },
        }
    }

    /// Whether another attempt follows after `made` have failed.
    pub fn allows_another(&self, made: u32) -> bool {
        made < self.max_attempts
    }
}

/// What a handler reports for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Success,
    /// The job decided not to run; never retried
    Cancelled(String),
    /// Failed; retried according to the job's policy
    Failure(String),
    /// Not ready yet; counts as an attempt but waits `Duration` instead of
    /// the policy's backoff
    RetryAfter(Duration),
}

/// How a finished attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptResult {
    Succeeded,
    Failed(String),
    Cancelled(String),
}

/// One finished attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub number: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub result: AttemptResult,
}

impl Attempt {
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// A deferred command execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Queue the job was submitted to; executors may filter on it.
    pub queue: String,
    pub envelope: CommandEnvelope,
    pub status: JobStatus,
    pub retry: RetryPolicy,
    /// Attempts started so far, the running one included.
    pub tries: u32,
    /// Earliest execution time; `None` means "as soon as possible".
    pub run_at: Option<DateTime<Utc>>,
    pub attempts: Vec<Attempt>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(queue: impl Into<String>, envelope: CommandEnvelope) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            queue: queue.into(),
            envelope,
            status: JobStatus::Pending,
            retry: RetryPolicy::default(),
            tries: 0,
            run_at: None,
            attempts: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn delayed(mut self, delay: Delay) -> Self {
        self.run_at = Some(delay.run_at(self.created_at));
        self
    }

    /// Registered name of the command this job runs.
    pub fn command(&self) -> &str {
        &self.envelope.command
    }

    /// Claimable and due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status.is_claimable() && self.run_at.is_none_or(|at| now >= at)
    }

    pub fn start(&mut self) {
        self.status = JobStatus::Running;
        self.tries += 1;
        self.updated_at = Utc::now();
    }

    /// Apply a handler's report for the attempt begun at `started_at`.
    ///
    /// Failures move to `Retrying` while the policy allows another attempt,
    /// otherwise to `DeadLettered`.
    pub fn settle(&mut self, result: JobResult, started_at: DateTime<Utc>) {
        let now = Utc::now();
        let (status, recorded) = match result {
            JobResult::Success => (JobStatus::Completed, AttemptResult::Succeeded),
            JobResult::Cancelled(reason) => (
                JobStatus::Cancelled { reason: reason.clone() },
                AttemptResult::Cancelled(reason),
            ),
            JobResult::Failure(error) => {
                let wait = self.retry.backoff.after(self.tries);
                (self.after_failure(error.clone(), wait, now), AttemptResult::Failed(error))
            }
            JobResult::RetryAfter(wait) => {
                let error = format!("retry requested after {}ms", wait.as_millis());
                (self.after_failure(error.clone(), wait, now), AttemptResult::Failed(error))
            }
        };

        self.attempts.push(Attempt {
            number: self.tries,
            started_at,
            finished_at: now,
            result: recorded,
        });
        self.status = status;
        self.updated_at = now;
    }

    fn after_failure(&mut self, error: String, wait: Duration, now: DateTime<Utc>) -> JobStatus {
        if self.retry.allows_another(self.tries) {
            self.run_at = Some(Delay::Wait(wait).run_at(now));
            JobStatus::Retrying { error }
        } else {
            JobStatus::DeadLettered { error }
        }
    }

    /// Back to `Pending` with a clean slate, keeping identity and payload.
    pub fn reset(&mut self) {
        self.status = JobStatus::Pending;
        self.tries = 0;
        self.run_at = None;
        self.attempts.clear();
        self.updated_at = Utc::now();
    }
}

/// A job parked after exhausting its retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub job: Job,
    pub reason: String,
    pub at: DateTime<Utc>,
}
