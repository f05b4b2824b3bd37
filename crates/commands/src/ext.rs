//! One-shot invocation helpers available on every command value.

use forgecmd_core::{AttributeMap, Input};
use forgecmd_events::Outcome;
use forgecmd_infra::jobs::{Delay, JobScheduler};
use serde_json::Value;

use crate::command::Command;
use crate::deferred::Deferral;
use crate::error::CommandError;
use crate::instance::Instance;
use crate::params::attributes_from_params;

/// `call`, `call_later`, `call_at` and `call_for`, each with a `*_with`
/// variant whose closure registers listeners before anything runs.
///
/// ```ignore
/// CreatePost::new(ctx).call_with(input, |cmd| {
///     cmd.on_ok(|post| redirect(post))
///        .on_invalid(|errors| render_form(errors));
/// })?;
/// ```
pub trait CommandExt: Command {
    fn call(self, input: impl Into<Input>) -> Result<Outcome<Self::Output>, CommandError> {
        self.call_with(input, |_| {})
    }

    fn call_with<'a, F>(self, input: impl Into<Input>, configure: F) -> Result<Outcome<Self::Output>, CommandError>
    where
        F: FnOnce(&mut Instance<'a, Self>),
    {
        let mut instance = Instance::new(self, input)?;
        configure(&mut instance);
        instance.call()
    }

    fn call_later(self, scheduler: &dyn JobScheduler, input: impl Into<Input>) -> Result<Deferral, CommandError> {
        self.call_later_with(scheduler, input, |_| {})
    }

    fn call_later_with<'a, F>(
        self,
        scheduler: &dyn JobScheduler,
        input: impl Into<Input>,
        configure: F,
    ) -> Result<Deferral, CommandError>
    where
        F: FnOnce(&mut Instance<'a, Self>),
    {
        let mut instance = Instance::new(self, input)?;
        configure(&mut instance);
        instance.call_later(scheduler)
    }

    fn call_at(
        self,
        scheduler: &dyn JobScheduler,
        delay: impl Into<Delay>,
        input: impl Into<Input>,
    ) -> Result<Deferral, CommandError> {
        self.call_at_with(scheduler, delay, input, |_| {})
    }

    fn call_at_with<'a, F>(
        self,
        scheduler: &dyn JobScheduler,
        delay: impl Into<Delay>,
        input: impl Into<Input>,
        configure: F,
    ) -> Result<Deferral, CommandError>
    where
        F: FnOnce(&mut Instance<'a, Self>),
    {
        let mut instance = Instance::new(self, input)?;
        configure(&mut instance);
        instance.call_at(scheduler, delay)
    }

    /// Immediate call from request parameters plus trusted extras.
    fn call_for(self, params: &Value, extra: AttributeMap) -> Result<Outcome<Self::Output>, CommandError> {
        self.call_for_with(params, extra, |_| {})
    }

    fn call_for_with<'a, F>(
        self,
        params: &Value,
        extra: AttributeMap,
        configure: F,
    ) -> Result<Outcome<Self::Output>, CommandError>
    where
        F: FnOnce(&mut Instance<'a, Self>),
    {
        self.call_with(attributes_from_params::<Self>(params, extra), configure)
    }
}

impl<C: Command> CommandExt for C {}
