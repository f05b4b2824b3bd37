//! Optimistic concurrency expectations, the usual backing for a staleness check.

use serde::{Deserialize, Serialize};

/// What version of a record a command expects to find.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpectedVersion {
    /// Skip version checking.
    Any,
    /// Require the record to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    /// `Exact(v)` when a version was supplied, `Any` otherwise.
    pub fn from_option(version: Option<u64>) -> Self {
        version.map_or(Self::Any, Self::Exact)
    }

    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    /// True when the expectation no longer holds for `actual`.
    pub fn is_stale(self, actual: u64) -> bool {
        !self.matches(actual)
    }
}
