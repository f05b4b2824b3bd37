//! `forgecmd`: validated, authorized, optionally transactional commands
//! whose outcome is delivered as a named event.
//!
//! ## Outcomes
//!
//! Every invocation ends in at most one of `ok`, `invalid`,
//! `unauthorized`, `stale` or `abort`. Callers register listeners for the
//! outcomes they care about; a failure nobody listened to is returned as the
//! matching [`CommandError`] instead.
//!
//! ## Invocation
//!
//! - immediate: [`CommandExt::call`] / [`Instance::call`]
//! - deferred: [`CommandExt::call_later`], [`CommandExt::call_at`]; the
//!   command is validated now and again when the job runs ([`perform`])
//! - from request parameters: [`CommandExt::call_for`]
//!
//! Generic record commands live in [`crud`].

pub mod binding;
pub mod command;
pub mod crud;
pub mod deferred;
pub mod error;
pub mod ext;
pub mod instance;
pub mod params;
pub mod preflight;

pub use command::{Authorizable, Command, ProcessContext, Stalenessable};
pub use deferred::{Deferral, RegisterCommand, perform};
pub use error::{CommandError, ProcessError};
pub use ext::CommandExt;
pub use instance::Instance;
pub use params::attributes_from_params;
pub use preflight::PreflightState;

pub use forgecmd_core::{
    AttrType, AttributeError, AttributeMap, Attributes, BASE, Errors, FieldError, Input, Rule, Schema, Validatable,
};
pub use forgecmd_events::{Outcome, OutcomeKind};
