//! Terminal outcomes of a command invocation.

use serde::{Deserialize, Serialize};

use forgecmd_core::Errors;

/// Name of a terminal outcome event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Ok,
    Invalid,
    Unauthorized,
    Stale,
    Abort,
}

impl OutcomeKind {
    /// Every failure event, in preflight order followed by `abort`.
    pub const FAILURES: [OutcomeKind; 4] = [
        OutcomeKind::Unauthorized,
        OutcomeKind::Invalid,
        OutcomeKind::Stale,
        OutcomeKind::Abort,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeKind::Ok => "ok",
            OutcomeKind::Invalid => "invalid",
            OutcomeKind::Unauthorized => "unauthorized",
            OutcomeKind::Stale => "stale",
            OutcomeKind::Abort => "abort",
        }
    }

    pub fn is_failure(self) -> bool {
        self != OutcomeKind::Ok
    }
}

impl core::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A broadcast outcome together with its payload.
///
/// `Ok(None)` is the deferred "scheduled" acknowledgement; an immediate call
/// that completes carries `Ok(Some(output))`.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Ok(Option<T>),
    Invalid(Errors),
    Unauthorized,
    Stale,
    Abort(Errors),
}

impl<T> Outcome<T> {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Ok(_) => OutcomeKind::Ok,
            Outcome::Invalid(_) => OutcomeKind::Invalid,
            Outcome::Unauthorized => OutcomeKind::Unauthorized,
            Outcome::Stale => OutcomeKind::Stale,
            Outcome::Abort(_) => OutcomeKind::Abort,
        }
    }

    /// Error collection carried by `invalid` and `abort`.
    pub fn errors(&self) -> Option<&Errors> {
        match self {
            Outcome::Invalid(errors) | Outcome::Abort(errors) => Some(errors),
            _ => None,
        }
    }

    pub fn payload(&self) -> Option<&T> {
        match self {
            Outcome::Ok(payload) => payload.as_ref(),
            _ => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    /// Drop the payload, keeping only what a failure carries.
    pub fn without_payload<U>(&self) -> Outcome<U> {
        match self {
            Outcome::Ok(_) => Outcome::Ok(None),
            Outcome::Invalid(errors) => Outcome::Invalid(errors.clone()),
            Outcome::Unauthorized => Outcome::Unauthorized,
            Outcome::Stale => Outcome::Stale,
            Outcome::Abort(errors) => Outcome::Abort(errors.clone()),
        }
    }
}
