use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque `"<resource>.<action>"` strings (e.g. "posts.update").
/// Two wildcard shapes are understood: `"*"` grants everything and
/// `"<resource>.*"` grants every action on one resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// The permission required to perform `action` on `resource`.
    pub fn for_action(resource: &str, action: &str) -> Self {
        Self(Cow::Owned(format!("{resource}.{action}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    /// Whether holding `self` satisfies `required`.
    pub fn grants(&self, required: &Permission) -> bool {
        if self.is_wildcard() || self == required {
            return true;
        }
        match self.as_str().strip_suffix(".*") {
            Some(resource) => required
                .as_str()
                .strip_prefix(resource)
                .is_some_and(|rest| rest.starts_with('.')),
            None => false,
        }
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
