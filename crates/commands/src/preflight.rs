//! Preflight: the ordered checks that gate every invocation.
//!
//! `authorized` → `valid` → `stale`, halting at the first failure. The
//! machine is re-entrant: every run starts from [`PreflightState::Unchecked`]
//! and reads the attributes as they are at that moment.

use forgecmd_core::{Attributes, Errors, run_validations};
use forgecmd_events::OutcomeKind;
use tracing::debug;

use crate::command::Command;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum PreflightState {
    #[default]
    Unchecked,
    Authorized,
    RejectedUnauthorized,
    Validated,
    RejectedInvalid,
    Fresh,
    RejectedStale,
    Ready,
}

impl PreflightState {
    pub fn is_ready(self) -> bool {
        self == PreflightState::Ready
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PreflightState::Ready
                | PreflightState::RejectedUnauthorized
                | PreflightState::RejectedInvalid
                | PreflightState::RejectedStale
        )
    }

    /// Outcome to broadcast for a rejected state.
    pub fn rejection(self) -> Option<OutcomeKind> {
        match self {
            PreflightState::RejectedUnauthorized => Some(OutcomeKind::Unauthorized),
            PreflightState::RejectedInvalid => Some(OutcomeKind::Invalid),
            PreflightState::RejectedStale => Some(OutcomeKind::Stale),
            _ => None,
        }
    }

    fn step<C: Command>(self, command: &mut C, attributes: &Attributes, errors: &mut Errors) -> Self {
        match self {
            PreflightState::Unchecked if command.authorized(attributes) => PreflightState::Authorized,
            PreflightState::Unchecked => PreflightState::RejectedUnauthorized,
            PreflightState::Authorized => {
                run_validations(command, attributes, errors);
                if errors.is_empty() {
                    PreflightState::Validated
                } else {
                    PreflightState::RejectedInvalid
                }
            }
            PreflightState::Validated if command.stale(attributes) => PreflightState::RejectedStale,
            PreflightState::Validated => PreflightState::Fresh,
            PreflightState::Fresh => PreflightState::Ready,
            terminal => terminal,
        }
    }
}

/// Run every check from scratch. Validation errors land in `errors`.
pub fn run<C: Command>(command: &mut C, attributes: &Attributes, errors: &mut Errors) -> PreflightState {
    let mut state = PreflightState::Unchecked;
    while !state.is_terminal() {
        state = state.step(command, attributes, errors);
    }
    if let Some(kind) = state.rejection() {
        debug!(command = C::NAME, outcome = %kind, errors = errors.len(), "preflight rejected");
    }
    state
}
