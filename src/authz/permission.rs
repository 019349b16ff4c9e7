//! Permission strings of the form `resource:action` and their matching rule.
//!
//! A held permission may carry `*` in either half; a required permission is always
//! concrete. A bare `*` is the full wildcard and is stored as `*:*`.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const WILDCARD: &str = "*";
const SEPARATOR: char = ':';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    #[error("malformed permission '{0}'")]
    MalformedPermission(String),
}

/// Fixed action vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    Write,
    Update,
    Delete,
    Create,
    Describe,
    List,
    UpdateMeta,
    DeleteTable,
}

impl Action {
    pub const ALL: [Action; 9] = [
        Action::Read,
        Action::Write,
        Action::Update,
        Action::Delete,
        Action::Create,
        Action::Describe,
        Action::List,
        Action::UpdateMeta,
        Action::DeleteTable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Create => "create",
            Action::Describe => "describe",
            Action::List => "list",
            Action::UpdateMeta => "update_meta",
            Action::DeleteTable => "delete_table",
        }
    }

    pub fn parse(s: &str) -> Option<Action> {
        Action::ALL.iter().copied().find(|a| a.as_str() == s)
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// One half of a permission: a concrete value or `*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment<T> {
    Any,
    Exact(T),
}

impl<T: PartialEq> Segment<T> {
    fn covers(&self, value: &T) -> bool {
        match self {
            Segment::Any => true,
            Segment::Exact(v) => v == value,
        }
    }
}

/// A permission as held by a role. Either half may be a wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Permission {
    resource: Segment<String>,
    action: Segment<Action>,
}

impl Permission {
    /// Full wildcard (`*`).
    pub fn all() -> Self { Self { resource: Segment::Any, action: Segment::Any } }

    /// Concrete `resource:action` pair. The resource is lower-cased.
    pub fn exact(resource: &str, action: Action) -> Self {
        Self { resource: Segment::Exact(resource.trim().to_ascii_lowercase()), action: Segment::Exact(action) }
    }

    pub fn resource(&self) -> Option<&str> {
        match &self.resource {
            Segment::Any => None,
            Segment::Exact(r) => Some(r.as_str()),
        }
    }

    pub fn action(&self) -> Option<Action> {
        match self.action {
            Segment::Any => None,
            Segment::Exact(a) => Some(a),
        }
    }

    pub fn is_full_wildcard(&self) -> bool {
        matches!((&self.resource, &self.action), (Segment::Any, Segment::Any))
    }

    /// True when this (held) permission grants `required`. Wildcards match a whole half
    /// only; there is no prefix matching inside a segment.
    pub fn grants(&self, required: &Permission) -> bool {
        let resource_ok = match (&self.resource, &required.resource) {
            (Segment::Any, _) => true,
            (Segment::Exact(_), Segment::Any) => false,
            (Segment::Exact(held), Segment::Exact(req)) => held == req,
        };
        let action_ok = match required.action {
            Segment::Any => matches!(self.action, Segment::Any),
            Segment::Exact(a) => self.action.covers(&a),
        };
        resource_ok && action_ok
    }

    /// Parse one stored role entry.
    ///
    /// Accepted forms: `*`, `resource:action` (either half may be `*`), and a bare action
    /// such as `read`, which is read as `*:read`.
    pub fn parse(raw: &str) -> Result<Self, PermissionError> {
        let s = raw.trim();
        let malformed = || PermissionError::MalformedPermission(raw.to_string());
        if s == WILDCARD { return Ok(Self::all()); }
        let (res, act) = match s.split_once(SEPARATOR) {
            Some((r, a)) => (r.trim(), a.trim()),
            None => (WILDCARD, s),
        };
        if res.is_empty() || act.is_empty() { return Err(malformed()); }
        if act.contains(SEPARATOR) { return Err(malformed()); }
        let resource = if res == WILDCARD { Segment::Any } else { Segment::Exact(res.to_ascii_lowercase()) };
        let action = if act == WILDCARD {
            Segment::Any
        } else {
            Segment::Exact(Action::parse(&act.to_ascii_lowercase()).ok_or_else(malformed)?)
        };
        Ok(Self { resource, action })
    }

    /// Parse a role's stored entries. An entry may itself be a comma-separated list
    /// (`read,write,update,delete`).
    pub fn parse_entries<I, S>(entries: I) -> Result<Vec<Permission>, PermissionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.as_ref();
            if entry.contains(',') {
                for part in entry.split(',') { out.push(Permission::parse(part)?); }
            } else {
                out.push(Permission::parse(entry)?);
            }
        }
        Ok(out)
    }
}

impl FromStr for Permission {
    type Err = PermissionError;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Permission::parse(s) }
}

impl Display for Permission {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_full_wildcard() { return f.write_str(WILDCARD); }
        match &self.resource {
            Segment::Any => f.write_str(WILDCARD)?,
            Segment::Exact(r) => f.write_str(r)?,
        }
        f.write_str(":")?;
        match &self.action {
            Segment::Any => f.write_str(WILDCARD),
            Segment::Exact(a) => f.write_str(a.as_str()),
        }
    }
}

impl Serialize for Permission {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Permission {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Permission::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// The effective permission set of one role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrants {
    pub role: String,
    pub permissions: Vec<Permission>,
}

impl RoleGrants {
    pub fn new(role: impl Into<String>, permissions: Vec<Permission>) -> Self {
        Self { role: role.into(), permissions }
    }

    pub fn has_full_wildcard(&self) -> bool { self.permissions.iter().any(Permission::is_full_wildcard) }

    pub fn grants(&self, required: &Permission) -> bool { self.permissions.iter().any(|p| p.grants(required)) }
}

#[cfg(test)]
#[path = "permission_tests.rs"]
mod permission_tests;
