//! Authorization gate: the single allow/deny choke point used by every front-end.
//!
//! Decision order:
//! 1. classify the operation (caller errors propagate and are never verdicts)
//! 2. resolve the principal's role (any failure is a fault denial)
//! 3. sensitive-resource override for `users` and `roles`
//! 4. generic wildcard/exact matching
//!
//! Step 3 runs before step 4 so a literal grant such as `users:read` held by a role
//! without the full wildcard can never open the RBAC tables.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::classifier::{self, ClassifyError, Operation};
use super::permission::{Permission, RoleGrants};
use super::resolver::{resolve_permissions, ResolveError, RoleStore};
use crate::identity::Principal;

/// Resources holding the RBAC configuration itself.
pub const SENSITIVE_RESOURCES: [&str; 2] = ["users", "roles"];

pub const UNAVAILABLE_REASON: &str = "authorization unavailable";

pub fn is_sensitive(resource: &str) -> bool {
    let r = resource.trim();
    SENSITIVE_RESOURCES.iter().any(|s| s.eq_ignore_ascii_case(r))
}

/// Why a denial was a fault rather than a policy decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fault {
    UnknownRole,
    RoleStoreUnavailable,
    MalformedPermission,
}

impl Fault {
    pub fn is_retryable(&self) -> bool { matches!(self, Fault::RoleStoreUnavailable) }
}

impl From<&ResolveError> for Fault {
    fn from(e: &ResolveError) -> Self {
        match e {
            ResolveError::UnknownRole(_) => Fault::UnknownRole,
            ResolveError::RoleStoreUnavailable(_) => Fault::RoleStoreUnavailable,
            ResolveError::MalformedPermission { .. } => Fault::MalformedPermission,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Allowed {
        permission: Permission,
    },
    Denied {
        permission: Permission,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        fault: Option<Fault>,
    },
}

impl Verdict {
    pub fn is_allowed(&self) -> bool { matches!(self, Verdict::Allowed { .. }) }

    /// The permission the request required, present on both outcomes.
    pub fn permission(&self) -> &Permission {
        match self {
            Verdict::Allowed { permission } | Verdict::Denied { permission, .. } => permission,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Verdict::Allowed { .. } => None,
            Verdict::Denied { reason, .. } => Some(reason.as_str()),
        }
    }

    pub fn fault(&self) -> Option<Fault> {
        match self {
            Verdict::Allowed { .. } => None,
            Verdict::Denied { fault, .. } => *fault,
        }
    }
}

pub fn denial_reason(principal: &Principal, required: &Permission) -> String {
    format!(
        "user '{}' (role: {}) lacks required permission '{}'",
        principal.identity, principal.role, required
    )
}

/// Evaluate steps 3 and 4 against an already-resolved permission set.
pub fn evaluate(principal: &Principal, grants: &RoleGrants, required: Permission, target: Option<&str>) -> Verdict {
    let sensitive = target.map(is_sensitive).unwrap_or(false);
    if sensitive && !grants.has_full_wildcard() {
        info!(
            target: "kvguard::authz",
            user = %principal.identity, role = %principal.role, permission = %required,
            "denied: sensitive resource requires full wildcard"
        );
        let reason = denial_reason(principal, &required);
        return Verdict::Denied { permission: required, reason, fault: None };
    }
    if grants.grants(&required) {
        debug!(target: "kvguard::authz", user = %principal.identity, role = %principal.role, permission = %required, "allowed");
        return Verdict::Allowed { permission: required };
    }
    info!(target: "kvguard::authz", user = %principal.identity, role = %principal.role, permission = %required, "denied");
    let reason = denial_reason(principal, &required);
    Verdict::Denied { permission: required, reason, fault: None }
}

/// Denial produced when the role could not be resolved.
pub fn fault_verdict(principal: &Principal, required: Permission, err: &ResolveError) -> Verdict {
    let fault = Fault::from(err);
    match err {
        ResolveError::RoleStoreUnavailable(_) => {
            warn!(target: "kvguard::authz", user = %principal.identity, role = %principal.role, permission = %required, error = %err, "authorization fault")
        }
        _ => {
            tracing::error!(target: "kvguard::authz", user = %principal.identity, role = %principal.role, permission = %required, error = %err, "authorization fault")
        }
    }
    Verdict::Denied { permission: required, reason: UNAVAILABLE_REASON.to_string(), fault: Some(fault) }
}

/// Stateless gate over a role store. Cloning shares the store.
#[derive(Debug, Clone)]
pub struct Authorizer<S> {
    roles: S,
}

impl<S: RoleStore> Authorizer<S> {
    pub fn new(roles: S) -> Self { Self { roles } }

    pub fn role_store(&self) -> &S { &self.roles }

    /// Decide whether `principal` may run `operation_name` against `target`.
    pub fn authorize(&self, principal: &Principal, operation_name: &str, target: Option<&str>) -> Result<Verdict, ClassifyError> {
        let op = Operation::from_name(operation_name).map_err(|e| {
            debug!(target: "kvguard::usage", user = %principal.identity, operation = operation_name, error = %e, "classification failed");
            e
        })?;
        self.authorize_operation(principal, op, target)
    }

    pub fn authorize_operation(&self, principal: &Principal, op: Operation, target: Option<&str>) -> Result<Verdict, ClassifyError> {
        let required = classifier::required_permission(op, target).map_err(|e| {
            debug!(target: "kvguard::usage", user = %principal.identity, operation = %op, error = %e, "classification failed");
            e
        })?;
        Ok(match resolve_permissions(&self.roles, principal) {
            Ok(grants) => evaluate(principal, &grants, required, target),
            Err(err) => fault_verdict(principal, required, &err),
        })
    }

    /// Authorize an operation touching several tables (batch requests). Every table must
    /// be allowed; the first denial is returned.
    pub fn authorize_all<'a, I>(&self, principal: &Principal, op: Operation, targets: I) -> Result<Verdict, ClassifyError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut last: Option<Verdict> = None;
        for target in targets {
            let verdict = self.authorize_operation(principal, op, Some(target))?;
            if !verdict.is_allowed() { return Ok(verdict); }
            last = Some(verdict);
        }
        match last {
            Some(v) => Ok(v),
            None => Err(ClassifyError::MissingTarget(op)),
        }
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod gate_tests;
