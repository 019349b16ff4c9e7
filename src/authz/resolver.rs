//! Resolves a principal's effective permission set through the role store.

use std::sync::Arc;

use thiserror::Error;

use super::permission::{Permission, PermissionError, RoleGrants};
use crate::identity::Principal;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleStoreError {
    #[error("role store unavailable: {0}")]
    Unavailable(String),
}

/// Read-only role lookup. Implementations are consulted on every decision.
pub trait RoleStore: Send + Sync {
    /// Stored permission entries for `role`, or `None` when the role does not exist.
    fn get_permissions(&self, role: &str) -> Result<Option<Vec<String>>, RoleStoreError>;
}

impl<T: RoleStore + ?Sized> RoleStore for Arc<T> {
    fn get_permissions(&self, role: &str) -> Result<Option<Vec<String>>, RoleStoreError> {
        (**self).get_permissions(role)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("unknown role '{0}'")]
    UnknownRole(String),
    #[error("role store unavailable: {0}")]
    RoleStoreUnavailable(String),
    #[error("role '{role}' has a malformed permission: {source}")]
    MalformedPermission { role: String, source: PermissionError },
}

impl ResolveError {
    /// Only transient backend faults may be retried by the caller.
    pub fn is_retryable(&self) -> bool { matches!(self, ResolveError::RoleStoreUnavailable(_)) }
}

impl From<RoleStoreError> for ResolveError {
    fn from(e: RoleStoreError) -> Self {
        match e {
            RoleStoreError::Unavailable(m) => ResolveError::RoleStoreUnavailable(m),
        }
    }
}

/// Load and parse the permission set bound to the principal's role.
pub fn resolve_permissions<S: RoleStore + ?Sized>(store: &S, principal: &Principal) -> Result<RoleGrants, ResolveError> {
    let role = principal.role.as_str();
    let entries = store.get_permissions(role)?.ok_or_else(|| ResolveError::UnknownRole(role.to_string()))?;
    let permissions = Permission::parse_entries(&entries)
        .map_err(|source| ResolveError::MalformedPermission { role: role.to_string(), source })?;
    Ok(RoleGrants::new(role, permissions))
}

/// Fixed in-memory role table. Useful for tests and for embedding a static policy.
#[derive(Debug, Clone, Default)]
pub struct StaticRoleStore {
    roles: std::collections::HashMap<String, Vec<String>>,
}

impl StaticRoleStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_role<I, S>(mut self, role: &str, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.insert(role.to_string(), permissions.into_iter().map(Into::into).collect());
        self
    }
}

impl RoleStore for StaticRoleStore {
    fn get_permissions(&self, role: &str) -> Result<Option<Vec<String>>, RoleStoreError> {
        Ok(self.roles.get(role).cloned())
    }
}
