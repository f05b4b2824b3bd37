//! Record-level authorization decisions for commands.
//!
//! Commands ask a [`PolicyResolver`] whether an actor may perform an action
//! on a resource (and, when one is loaded, on a particular record). The
//! framework never interprets the answer beyond "allowed or not".

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use forgecmd_core::Record;

use crate::{Actor, Permission, RoleMap};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("no actor")]
    Anonymous,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Authorize an actor against a required permission, using its explicit
/// permissions and whatever its roles grant.
///
/// - No IO
/// - No panics
pub fn authorize(actor: Option<&Actor>, roles: &RoleMap, required: &Permission) -> Result<(), AuthzError> {
    let actor = actor.ok_or(AuthzError::Anonymous)?;

    let granted = actor
        .permissions
        .iter()
        .chain(actor.roles.iter().flat_map(|r| roles.permissions(r)))
        .any(|p| p.grants(required));

    if granted {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Answers `permission(actor, action, resource, record)`.
pub trait PolicyResolver: Send + Sync {
    fn permission(
        &self,
        actor: Option<&Actor>,
        action: &str,
        resource: &str,
        record: Option<&dyn Record>,
    ) -> bool;
}

impl<P: PolicyResolver + ?Sized> PolicyResolver for Arc<P> {
    fn permission(
        &self,
        actor: Option<&Actor>,
        action: &str,
        resource: &str,
        record: Option<&dyn Record>,
    ) -> bool {
        (**self).permission(actor, action, resource, record)
    }
}

impl<P: PolicyResolver + ?Sized> PolicyResolver for &P {
    fn permission(
        &self,
        actor: Option<&Actor>,
        action: &str,
        resource: &str,
        record: Option<&dyn Record>,
    ) -> bool {
        (**self).permission(actor, action, resource, record)
    }
}

/// Permission-string policy: grants `"<resource>.<action>"` from the
/// actor's permissions or roles, and optionally lets a record's owner act
/// on it.
#[derive(Debug, Clone, Default)]
pub struct PermissionPolicy {
    roles: RoleMap,
    owner_field: Option<String>,
}

impl PermissionPolicy {
    pub fn new(roles: RoleMap) -> Self {
        Self {
            roles,
            owner_field: None,
        }
    }

    /// Actors whose id equals `record[field]` may perform any action on it.
    pub fn with_owner_field(mut self, field: impl Into<String>) -> Self {
        self.owner_field = Some(field.into());
        self
    }

    fn owns(&self, actor: &Actor, record: &dyn Record) -> bool {
        let Some(field) = &self.owner_field else {
            return false;
        };
        match record.fields().get(field) {
            Some(Value::String(owner)) => owner.trim() == actor.id.to_string(),
            _ => false,
        }
    }
}

impl PolicyResolver for PermissionPolicy {
    fn permission(
        &self,
        actor: Option<&Actor>,
        action: &str,
        resource: &str,
        record: Option<&dyn Record>,
    ) -> bool {
        let required = Permission::for_action(resource, action);
        match authorize(actor, &self.roles, &required) {
            Ok(()) => true,
            Err(AuthzError::Anonymous) => false,
            Err(AuthzError::Forbidden(_)) => {
                let owned = matches!((actor, record), (Some(a), Some(r)) if self.owns(a, r));
                if !owned {
                    tracing::debug!(permission = %required, "permission denied");
                }
                owned
            }
        }
    }
}

/// Policy that allows everything. Useful for commands without access rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PolicyResolver for AllowAll {
    fn permission(&self, _: Option<&Actor>, _: &str, _: &str, _: Option<&dyn Record>) -> bool {
        true
    }
}
