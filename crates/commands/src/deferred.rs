//! Deferred execution: validate now, run later on the job service.
//!
//! ## Scheduling side
//!
//! `call_later` / `call_at` run the full preflight first. A rejected command
//! is never submitted; the rejection is broadcast exactly like an immediate
//! call. A ready command is submitted as a [`CommandEnvelope`] (type name
//! plus merged raw input) and `ok(None)` is broadcast: "scheduled", not
//! "completed".
//!
//! ## Executing side
//!
//! [`perform`] rebuilds a fresh instance from the envelope and runs the whole
//! immediate path again, preflight included. Failure outcomes are silenced;
//! the job just ends as cancelled.

use forgecmd_events::{Outcome, OutcomeKind};
use forgecmd_infra::jobs::{CommandEnvelope, Delay, JobExecutor, JobId, JobResult, JobScheduler, JobStore};
use tracing::{info, info_span};

use crate::command::Command;
use crate::error::CommandError;
use crate::instance::Instance;

/// What a deferred call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferral {
    Scheduled(JobId),
    /// Preflight failed; nothing was submitted.
    Rejected(OutcomeKind),
}

impl Deferral {
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Deferral::Scheduled(id) => Some(*id),
            Deferral::Rejected(_) => None,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        matches!(self, Deferral::Scheduled(_))
    }
}

impl<C: Command> Instance<'_, C> {
    /// Submit for immediate background execution.
    pub fn call_later(&mut self, scheduler: &dyn JobScheduler) -> Result<Deferral, CommandError> {
        self.defer(scheduler, None)
    }

    /// Submit for execution after a delay or at an absolute time.
    pub fn call_at(&mut self, scheduler: &dyn JobScheduler, delay: impl Into<Delay>) -> Result<Deferral, CommandError> {
        self.defer(scheduler, Some(delay.into()))
    }

    /// What a deferred call of this instance submits.
    pub fn envelope(&self) -> CommandEnvelope {
        CommandEnvelope::new(C::NAME, self.input().clone())
    }

    fn defer(&mut self, scheduler: &dyn JobScheduler, delay: Option<Delay>) -> Result<Deferral, CommandError> {
        let span = info_span!("command", command = C::NAME, deferred = true);
        let _enter = span.enter();

        if let Some(rejected) = self.reject_unless_ready()? {
            return Ok(Deferral::Rejected(rejected.kind()));
        }

        let envelope = self.envelope();
        let job_id = match delay {
            None => scheduler.submit(envelope)?,
            Some(delay) => scheduler.submit_at(envelope, delay)?,
        };
        info!(%job_id, "command deferred");

        self.deliver(Outcome::Ok(None))?;
        Ok(Deferral::Scheduled(job_id))
    }
}

/// Run a deferred command from its envelope.
///
/// `ok` completes the job; a rejection or abort cancels it; a body or
/// construction failure fails it so the retry policy applies.
pub fn perform<C: Command>(command: C, envelope: &CommandEnvelope) -> JobResult {
    if envelope.command != C::NAME {
        return JobResult::Failure(format!(
            "envelope for '{}' routed to '{}'",
            envelope.command,
            C::NAME
        ));
    }

    let mut instance = match Instance::new(command, envelope.attributes.clone()) {
        Ok(instance) => instance,
        Err(error) => return JobResult::Failure(error.to_string()),
    };
    instance.no_exceptions();

    match instance.call() {
        Ok(Outcome::Ok(_)) => JobResult::Success,
        Ok(Outcome::Abort(errors)) if !errors.is_empty() => {
            JobResult::Cancelled(format!("abort: {}", errors.to_sentence()))
        }
        Ok(outcome) => JobResult::Cancelled(outcome.kind().to_string()),
        Err(error) => JobResult::Failure(error.to_string()),
    }
}

/// Wire a command type into a job executor.
pub trait RegisterCommand {
    /// Handle envelopes named `C::NAME` with a fresh command from `factory`.
    fn register_command<C, F>(&mut self, factory: F)
    where
        C: Command,
        F: Fn() -> C + Send + Sync + 'static;
}

impl<S: JobStore + 'static> RegisterCommand for JobExecutor<S> {
    fn register_command<C, F>(&mut self, factory: F)
    where
        C: Command,
        F: Fn() -> C + Send + Sync + 'static,
    {
        self.register_handler(C::NAME, move |envelope: &CommandEnvelope| perform(factory(), envelope));
    }
}
