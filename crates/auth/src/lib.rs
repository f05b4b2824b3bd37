//! `forgecmd-auth`: actors and the authorization boundary for commands.
//!
//! Decoupled from transport and storage: authentication happens elsewhere,
//! this crate only answers "may this actor do that".

pub mod actor;
pub mod permissions;
pub mod policy;
pub mod roles;

pub use actor::Actor;
pub use permissions::Permission;
pub use policy::{AllowAll, AuthzError, PermissionPolicy, PolicyResolver, authorize};
pub use roles::{Role, RoleMap};
