//! Execution core: one command instance and its invocation lifecycle.
//!
//! ```text
//! construct (schema + input)
//!   ↓
//! preflight: authorized → valid → stale      (rejection: broadcast, stop)
//!   ↓
//! begin transaction                           (when TRANSACTIONAL)
//!   ↓
//! process ──abort──→ rollback → broadcast abort
//!   │  └──error──→ rollback → propagate unmodified
//!   ↓
//! commit → broadcast ok(output)
//! ```
//!
//! Every call broadcasts at most one terminal outcome. A failure outcome
//! nobody listened to becomes the matching [`CommandError`].

use forgecmd_core::{AttributeError, AttributeMap, AttributeResult, Attributes, Errors, Input, run_validations};
use forgecmd_events::{Listeners, Outcome, OutcomeKind};
use serde_json::Value;
use tracing::{info_span, warn};

use crate::command::{Command, ProcessContext};
use crate::error::{CommandError, ProcessError};
use crate::preflight::{self, PreflightState};

/// A constructed command together with the state of one invocation.
pub struct Instance<'a, C: Command> {
    command: C,
    attributes: Attributes,
    input: AttributeMap,
    errors: Errors,
    listeners: Listeners<'a, C::Output>,
    state: PreflightState,
}

impl<'a, C: Command> Instance<'a, C> {
    /// Resolve `input` against the command's schema.
    pub fn new(command: C, input: impl Into<Input>) -> Result<Self, AttributeError> {
        let input = input.into().merge()?;
        let attributes = C::schema().resolve(&input)?;
        Ok(Self {
            command,
            attributes,
            input,
            errors: Errors::new(),
            listeners: Listeners::new(),
            state: PreflightState::Unchecked,
        })
    }

    pub fn command(&self) -> &C {
        &self.command
    }

    pub fn command_mut(&mut self) -> &mut C {
        &mut self.command
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Explicit setter; later preflight checks see the new value.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> AttributeResult<()> {
        let value = value.into();
        self.attributes.set(name, value.clone())?;
        self.input.insert(name.to_string(), value);
        Ok(())
    }

    /// The merged raw input, as a deferred run would submit it.
    pub fn input(&self) -> &AttributeMap {
        &self.input
    }

    pub fn errors(&self) -> &Errors {
        &self.errors
    }

    /// State reached by the latest preflight run.
    pub fn state(&self) -> PreflightState {
        self.state
    }

    pub fn persisted(&self) -> bool {
        self.command.persisted()
    }

    pub fn on<F>(&mut self, kind: OutcomeKind, callback: F) -> &mut Self
    where
        F: FnMut(&Outcome<C::Output>) + 'a,
    {
        self.listeners.on(kind, callback);
        self
    }

    pub fn on_any<F>(&mut self, kinds: &[OutcomeKind], callback: F) -> &mut Self
    where
        F: FnMut(&Outcome<C::Output>) + 'a,
    {
        self.listeners.on_any(kinds, callback);
        self
    }

    /// `ok`; the payload is `None` for a deferred call.
    pub fn on_ok<F>(&mut self, mut callback: F) -> &mut Self
    where
        F: FnMut(Option<&C::Output>) + 'a,
    {
        self.on(OutcomeKind::Ok, move |outcome| callback(outcome.payload()))
    }

    pub fn on_invalid<F>(&mut self, mut callback: F) -> &mut Self
    where
        F: FnMut(&Errors) + 'a,
    {
        self.on(OutcomeKind::Invalid, move |outcome| {
            if let Some(errors) = outcome.errors() {
                callback(errors);
            }
        })
    }

    pub fn on_abort<F>(&mut self, mut callback: F) -> &mut Self
    where
        F: FnMut(&Errors) + 'a,
    {
        self.on(OutcomeKind::Abort, move |outcome| {
            if let Some(errors) = outcome.errors() {
                callback(errors);
            }
        })
    }

    pub fn on_unauthorized<F>(&mut self, mut callback: F) -> &mut Self
    where
        F: FnMut() + 'a,
    {
        self.on(OutcomeKind::Unauthorized, move |_| callback())
    }

    pub fn on_stale<F>(&mut self, mut callback: F) -> &mut Self
    where
        F: FnMut() + 'a,
    {
        self.on(OutcomeKind::Stale, move |_| callback())
    }

    /// Never raise on failure outcomes; the call just returns them.
    pub fn no_exceptions(&mut self) -> &mut Self {
        self.listeners.silence_failures();
        self
    }

    pub fn is_authorized(&mut self) -> bool {
        self.command.authorized(&self.attributes)
    }

    /// Re-run validation into [`errors`](Self::errors).
    pub fn is_valid(&mut self) -> bool {
        run_validations(&mut self.command, &self.attributes, &mut self.errors);
        self.errors.is_empty()
    }

    pub fn is_stale(&mut self) -> bool {
        self.command.stale(&self.attributes)
    }

    /// Run the preflight checks without broadcasting anything.
    pub fn preflight(&mut self) -> PreflightState {
        self.state = preflight::run(&mut self.command, &self.attributes, &mut self.errors);
        self.state
    }

    /// Immediate execution.
    pub fn call(&mut self) -> Result<Outcome<C::Output>, CommandError> {
        let span = info_span!("command", command = C::NAME);
        let _enter = span.enter();

        if let Some(rejected) = self.reject_unless_ready()? {
            return Ok(rejected);
        }
        self.execute()
    }

    /// Preflight; a rejection is broadcast and returned.
    pub(crate) fn reject_unless_ready(&mut self) -> Result<Option<Outcome<C::Output>>, CommandError> {
        let outcome = match self.preflight() {
            PreflightState::RejectedUnauthorized => Outcome::Unauthorized,
            PreflightState::RejectedInvalid => Outcome::Invalid(self.errors.clone()),
            PreflightState::RejectedStale => Outcome::Stale,
            _ => return Ok(None),
        };
        self.deliver(outcome).map(Some)
    }

    fn execute(&mut self) -> Result<Outcome<C::Output>, CommandError> {
        let transactional = C::TRANSACTIONAL;
        if transactional {
            self.command.transactions().begin()?;
        }

        let result = {
            let mut ctx = ProcessContext::new(&mut self.attributes, &self.input, &mut self.errors);
            self.command.process(&mut ctx)
        };

        match result {
            Ok(output) => {
                if transactional {
                    if let Err(error) = self.command.transactions().commit() {
                        self.rollback();
                        return Err(error.into());
                    }
                }
                self.deliver(Outcome::Ok(Some(output)))
            }
            Err(error) => {
                if transactional {
                    self.rollback();
                }
                match error {
                    ProcessError::Abort => {
                        let errors = self.errors.clone();
                        self.deliver(Outcome::Abort(errors))
                    }
                    ProcessError::NotImplemented => Err(CommandError::NotImplemented { command: C::NAME }),
                    ProcessError::Failed(error) => Err(CommandError::Process(error)),
                }
            }
        }
    }

    fn rollback(&self) {
        if let Err(error) = self.command.transactions().rollback() {
            warn!(command = C::NAME, %error, "rollback failed");
        }
    }

    /// Broadcast the terminal outcome; raise a failure nobody listened to.
    pub(crate) fn deliver(&mut self, outcome: Outcome<C::Output>) -> Result<Outcome<C::Output>, CommandError> {
        if self.listeners.broadcast(&outcome) {
            return Ok(outcome);
        }
        if outcome.kind().is_failure() {
            warn!(command = C::NAME, outcome = %outcome.kind(), "unhandled outcome");
        }
        match outcome {
            Outcome::Ok(payload) => Ok(Outcome::Ok(payload)),
            Outcome::Invalid(errors) => Err(CommandError::Invalid(errors)),
            Outcome::Unauthorized => Err(CommandError::Unauthorized),
            Outcome::Stale => Err(CommandError::Stale),
            Outcome::Abort(errors) => Err(CommandError::Aborted(errors)),
        }
    }
}

impl<C: Command + core::fmt::Debug> core::fmt::Debug for Instance<'_, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Instance")
            .field("command", &self.command)
            .field("attributes", &self.attributes)
            .field("errors", &self.errors)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
