//! Outcome events and the per-invocation broadcaster.

pub mod listeners;
pub mod outcome;

pub use listeners::Listeners;
pub use outcome::{Outcome, OutcomeKind};
