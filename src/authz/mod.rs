//! Role-based authorization for store operations.
//! Both front-ends call [`Authorizer::authorize`] once per request, before dispatch.

mod permission;
mod classifier;
mod resolver;
mod gate;

pub use permission::{Action, Permission, PermissionError, RoleGrants, WILDCARD};
pub use classifier::{classify, required_permission, ClassifyError, Operation, TABLE_RESOURCE};
pub use resolver::{resolve_permissions, ResolveError, RoleStore, RoleStoreError, StaticRoleStore};
pub use gate::{denial_reason, evaluate, fault_verdict, is_sensitive, Authorizer, Fault, Verdict, SENSITIVE_RESOURCES, UNAVAILABLE_REASON};
