//! The command contract.
//!
//! A command type bundles a declared attribute [`Schema`], the three
//! preflight capabilities and an optional body. The framework owns the
//! invocation lifecycle; the type only answers questions and does its work.
//!
//! ## Capabilities
//!
//! - [`Authorizable`]: may the current caller run this? (default: yes)
//! - [`Validatable`]: declared rules plus a free-form hook (default: none)
//! - [`Stalenessable`]: did the target move underneath us? (default: no)
//!
//! Each defaults to the permissive answer, so a command implements only the
//! checks it needs.

use forgecmd_core::{AttributeMap, Attributes, Errors, Schema, Validatable};
use forgecmd_infra::{NoTransactions, TransactionManager};

use crate::error::ProcessError;

/// Capability: an authorization decision over the current attributes.
pub trait Authorizable {
    fn authorized(&mut self, _attributes: &Attributes) -> bool {
        true
    }
}

/// Capability: a staleness decision (typically an optimistic version check).
pub trait Stalenessable {
    fn stale(&mut self, _attributes: &Attributes) -> bool {
        false
    }
}

/// A discrete business operation with a uniform execution contract.
pub trait Command: Validatable + Authorizable + Stalenessable + Sized + 'static {
    /// What a successful body produces; delivered with `ok`.
    type Output;

    /// Type identity submitted to the job service for deferred runs.
    const NAME: &'static str;

    /// Key under which request parameters nest this command's fields.
    const PARAM_KEY: &'static str = Self::NAME;

    /// Whether the body runs inside a transaction.
    const TRANSACTIONAL: bool = true;

    /// Skip per-field filtering of request parameters.
    const PERMIT_ALL_PARAMS: bool = false;

    /// Declared attributes; build once with [`Schema::cached`].
    fn schema() -> &'static Schema;

    /// Transaction boundary the body runs in when `TRANSACTIONAL`.
    fn transactions(&self) -> &dyn TransactionManager {
        &NoTransactions
    }

    /// The body. Runs only after every preflight check passed.
    fn process(&mut self, _ctx: &mut ProcessContext<'_>) -> Result<Self::Output, ProcessError> {
        Err(ProcessError::NotImplemented)
    }

    /// Whether the command edits an existing record (form builders).
    fn persisted(&self) -> bool {
        false
    }
}

/// What a body sees of its invocation: the attributes and the error
/// collection `abort` is delivered with.
pub struct ProcessContext<'i> {
    attributes: &'i mut Attributes,
    input: &'i AttributeMap,
    errors: &'i mut Errors,
}

impl<'i> ProcessContext<'i> {
    pub(crate) fn new(attributes: &'i mut Attributes, input: &'i AttributeMap, errors: &'i mut Errors) -> Self {
        Self {
            attributes,
            input,
            errors,
        }
    }

    pub fn attributes(&self) -> &Attributes {
        self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        self.attributes
    }

    /// Whether the caller supplied `name`, as opposed to it being defaulted.
    pub fn supplied(&self, name: &str) -> bool {
        self.input.contains_key(name)
    }

    pub fn errors(&self) -> &Errors {
        self.errors
    }

    pub fn errors_mut(&mut self) -> &mut Errors {
        self.errors
    }

    /// `return Err(ctx.abort())` ends the body with `abort`.
    pub fn abort(&self) -> ProcessError {
        ProcessError::Abort
    }

    /// Record an error, then abort.
    pub fn abort_with(
        &mut self,
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> ProcessError {
        self.errors.add_message(field, code, message);
        ProcessError::Abort
    }
}
