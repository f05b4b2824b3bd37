//! Error model of command invocation.
//!
//! Outcomes are normally delivered to listeners. A [`CommandError`] surfaces
//! only when an outcome went unattended, when construction or a
//! collaborator failed, or when the body itself failed.

use thiserror::Error;

use forgecmd_core::{AttributeError, Errors};
use forgecmd_events::OutcomeKind;
use forgecmd_infra::TransactionError;
use forgecmd_infra::jobs::SchedulerError;

#[derive(Debug, Error)]
pub enum CommandError {
    /// `unauthorized` was broadcast and nobody listened.
    #[error("unauthorized")]
    Unauthorized,

    /// `invalid` was broadcast and nobody listened.
    #[error("invalid: {0}")]
    Invalid(Errors),

    /// `stale` was broadcast and nobody listened.
    #[error("stale")]
    Stale,

    /// `abort` was broadcast and nobody listened.
    #[error("aborted: {0}")]
    Aborted(Errors),

    #[error("interface not implemented: {command} has no process body")]
    NotImplemented { command: &'static str },

    #[error(transparent)]
    Attribute(#[from] AttributeError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Schedule(#[from] SchedulerError),

    /// The body failed; the original error is kept as-is.
    #[error(transparent)]
    Process(anyhow::Error),
}

impl CommandError {
    /// The outcome this error stands for, if it is an unattended outcome.
    pub fn outcome(&self) -> Option<OutcomeKind> {
        match self {
            CommandError::Unauthorized => Some(OutcomeKind::Unauthorized),
            CommandError::Invalid(_) => Some(OutcomeKind::Invalid),
            CommandError::Stale => Some(OutcomeKind::Stale),
            CommandError::Aborted(_) => Some(OutcomeKind::Abort),
            _ => None,
        }
    }

    /// Errors carried by an unattended `invalid` or `abort`.
    pub fn errors(&self) -> Option<&Errors> {
        match self {
            CommandError::Invalid(errors) | CommandError::Aborted(errors) => Some(errors),
            _ => None,
        }
    }
}

/// How a command body ends when it does not produce output.
///
/// Any `std::error::Error` converts with `?` and propagates to the caller
/// unmodified. Use [`ProcessContext::abort`](crate::ProcessContext::abort)
/// for the orderly `abort` outcome instead.
pub enum ProcessError {
    /// Stop the body, roll back and broadcast `abort` with the current errors.
    Abort,
    /// The command type declares no body.
    NotImplemented,
    /// Any other failure.
    Failed(anyhow::Error),
}

impl ProcessError {
    pub fn failed(error: impl Into<anyhow::Error>) -> Self {
        ProcessError::Failed(error.into())
    }
}

impl<E> From<E> for ProcessError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        ProcessError::Failed(anyhow::Error::new(error))
    }
}

impl core::fmt::Debug for ProcessError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ProcessError::Abort => f.write_str("Abort"),
            ProcessError::NotImplemented => f.write_str("NotImplemented"),
            ProcessError::Failed(error) => f.debug_tuple("Failed").field(error).finish(),
        }
    }
}

impl core::fmt::Display for ProcessError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ProcessError::Abort => f.write_str("command aborted"),
            ProcessError::NotImplemented => f.write_str("process not implemented"),
            ProcessError::Failed(error) => core::fmt::Display::fmt(error, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("disk full")]
    struct DiskFull;

    fn write() -> Result<(), ProcessError> {
        Err(DiskFull)?;
        Ok(())
    }

    #[test]
    fn question_mark_keeps_the_original_error() {
        let Err(ProcessError::Failed(error)) = write() else {
            panic!("expected a failure");
        };
        assert!(error.downcast_ref::<DiskFull>().is_some());
        assert_eq!(error.to_string(), "disk full");
    }

    #[test]
    fn unattended_outcomes_map_back_to_kinds() {
        assert_eq!(CommandError::Stale.outcome(), Some(OutcomeKind::Stale));
        assert_eq!(
            CommandError::Aborted(Errors::default()).outcome(),
            Some(OutcomeKind::Abort)
        );
        assert_eq!(
            CommandError::NotImplemented { command: "x" }.outcome(),
            None
        );
    }
}
