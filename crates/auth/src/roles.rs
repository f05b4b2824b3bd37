use std::borrow::Cow;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role identifier used for RBAC.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role → granted permissions mapping consulted by the policy layer.
#[derive(Debug, Clone, Default)]
pub struct RoleMap {
    grants: HashMap<Role, Vec<Permission>>,
}

impl RoleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, role: impl Into<Cow<'static, str>>, permission: Permission) -> Self {
        self.grants.entry(Role::new(role)).or_default().push(permission);
        self
    }

    pub fn permissions(&self, role: &Role) -> &[Permission] {
        self.grants.get(role).map(Vec::as_slice).unwrap_or_default()
    }
}
