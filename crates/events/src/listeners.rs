//! Per-invocation outcome broadcaster.
//!
//! A [`Listeners`] registry lives exactly as long as one command invocation.
//! It is never process-wide: callers register callbacks before the call
//! starts and the registry is dropped when the call returns.
//!
//! ## Delivery
//!
//! - **Synchronous**: callbacks run to completion on the caller's thread,
//!   inside `broadcast`, so nothing runs after the invocation returns.
//! - **Ordered**: callbacks for one event run in registration order.
//! - **Borrowing**: callbacks may capture and mutate caller state for `'a`.
//!
//! `broadcast` reports whether anybody was listening; the execution core
//! uses that to turn unattended failures into typed errors.

use crate::outcome::{Outcome, OutcomeKind};

type Callback<'a, T> = Box<dyn FnMut(&Outcome<T>) + 'a>;

struct Registration<'a, T> {
    kinds: Vec<OutcomeKind>,
    callback: Callback<'a, T>,
}

/// Ordered callback registry for one invocation.
pub struct Listeners<'a, T> {
    registrations: Vec<Registration<'a, T>>,
}

impl<'a, T> Listeners<'a, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for one event.
    pub fn on<F>(&mut self, kind: OutcomeKind, callback: F) -> &mut Self
    where
        F: FnMut(&Outcome<T>) + 'a,
    {
        self.on_any(&[kind], callback)
    }

    /// Register one callback for several events; it runs once per broadcast.
    pub fn on_any<F>(&mut self, kinds: &[OutcomeKind], callback: F) -> &mut Self
    where
        F: FnMut(&Outcome<T>) + 'a,
    {
        self.registrations.push(Registration {
            kinds: kinds.to_vec(),
            callback: Box::new(callback),
        });
        self
    }

    /// No-op listeners for every failure event, so none of them is raised.
    pub fn silence_failures(&mut self) -> &mut Self {
        self.on_any(&OutcomeKind::FAILURES, |_| {})
    }

    pub fn has_listener(&self, kind: OutcomeKind) -> bool {
        self.registrations.iter().any(|r| r.kinds.contains(&kind))
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Run every callback registered for the outcome's event, in order.
    ///
    /// Returns `true` if at least one callback was registered for it.
    pub fn broadcast(&mut self, outcome: &Outcome<T>) -> bool {
        let kind = outcome.kind();
        let mut delivered = false;
        for registration in self
            .registrations
            .iter_mut()
            .filter(|r| r.kinds.contains(&kind))
        {
            (registration.callback)(outcome);
            delivered = true;
        }

        tracing::trace!(outcome = %kind, delivered, "outcome broadcast");
        delivered
    }
}

impl<T> Default for Listeners<'_, T> {
    fn default() -> Self {
        Self {
            registrations: Vec::new(),
        }
    }
}

impl<T> core::fmt::Debug for Listeners<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list()
            .entries(self.registrations.iter().map(|r| &r.kinds))
            .finish()
    }
}
