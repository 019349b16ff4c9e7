//! RBAC configuration tables (`users`, `roles`) kept in the store itself, Argon2 password
//! hashing, and the role store the gate reads on every decision.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};
use serde_json::{json, Value as JsonValue};
use tracing::info;

use crate::authz::{Permission, RoleStore, RoleStoreError};
use crate::storage::{Item, SharedStore, StoreError};

pub const USERS_TABLE: &str = "users";
pub const ROLES_TABLE: &str = "roles";
pub const USERS_KEY: &str = "username";
pub const ROLES_KEY: &str = "role_name";
pub const PERMISSIONS_ATTR: &str = "permissions";

/// Built-in roles written on first start.
pub const DEFAULT_ROLES: [(&str, &[&str]); 3] = [
    ("admin", &["*"]),
    ("writer", &["read,write,update,delete"]),
    ("reader", &["read"]),
];

pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
    Ok(phc)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

fn key(attr: &str, value: &str) -> Item {
    let mut m = Item::new();
    m.insert(attr.to_string(), JsonValue::String(value.to_string()));
    m
}

/// A row of the `users` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,
    pub password_hash: String,
    pub role_name: String,
}

/// `role_name` may be stored as a string or a list; the first list element is used.
fn role_from_attr(v: Option<&JsonValue>) -> Option<String> {
    match v? {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        JsonValue::Array(xs) => xs.first().and_then(|x| x.as_str()).map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        _ => None,
    }
}

pub fn find_user(store: &SharedStore, username: &str) -> Result<Option<UserRecord>, StoreError> {
    let Some(item) = store.get_item(USERS_TABLE, &key(USERS_KEY, username))? else { return Ok(None); };
    let password_hash = item.get("password_hash").and_then(|v| v.as_str()).unwrap_or("").to_string();
    let Some(role_name) = role_from_attr(item.get(ROLES_KEY)) else { return Ok(None); };
    Ok(Some(UserRecord { username: username.to_string(), password_hash, role_name }))
}

pub fn put_user(store: &SharedStore, username: &str, password: &str, role: &str) -> Result<()> {
    let hash = hash_password(password)?;
    let item = json!({ USERS_KEY: username, "password_hash": hash, ROLES_KEY: role });
    store.put_item(USERS_TABLE, item.as_object().cloned().unwrap_or_default())?;
    Ok(())
}

pub fn is_roles_table(table: &str) -> bool { table.trim().eq_ignore_ascii_case(ROLES_TABLE) }

/// Reject a `roles` row unless every permission entry is a string that parses.
/// A missing `permissions` attribute is an empty grant set.
pub fn validate_role_item(item: &Item) -> Result<(), StoreError> {
    let role = item.get(ROLES_KEY).and_then(|v| v.as_str()).unwrap_or("?");
    let invalid = |msg: String| StoreError::InvalidArgument(format!("role '{}': {}", role, msg));
    let entries: Vec<&str> = match item.get(PERMISSIONS_ATTR) {
        None | Some(JsonValue::Null) => Vec::new(),
        Some(JsonValue::String(s)) => vec![s.as_str()],
        Some(JsonValue::Array(xs)) => xs
            .iter()
            .map(|x| x.as_str().ok_or_else(|| invalid(format!("permission entry {} is not a string", x))))
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => return Err(invalid(format!("permissions must be a list of strings, got {}", other))),
    };
    Permission::parse_entries(entries).map_err(|e| invalid(e.to_string()))?;
    Ok(())
}

/// Check every stored role. Returns the number of roles checked.
pub fn validate_roles_table(store: &SharedStore) -> Result<usize, StoreError> {
    if !store.table_exists(ROLES_TABLE) { return Ok(0); }
    let roles = store.scan(ROLES_TABLE, None)?;
    for role in &roles {
        validate_role_item(role)?;
    }
    Ok(roles.len())
}

pub fn put_role(store: &SharedStore, role: &str, permissions: &[&str]) -> Result<(), StoreError> {
    let item = json!({ ROLES_KEY: role, PERMISSIONS_ATTR: permissions }).as_object().cloned().unwrap_or_default();
    validate_role_item(&item)?;
    store.put_item(ROLES_TABLE, item)?;
    Ok(())
}

/// Create the `users`/`roles` tables if missing and seed the built-in roles plus an
/// `admin` user when they are empty. Fails if any stored role carries a malformed permission.
pub fn ensure_security_tables(store: &SharedStore, admin_password: &str) -> Result<()> {
    if !store.table_exists(ROLES_TABLE) { store.create_table(ROLES_TABLE, ROLES_KEY, Some("RBAC roles".into()))?; }
    if !store.table_exists(USERS_TABLE) { store.create_table(USERS_TABLE, USERS_KEY, Some("RBAC users".into()))?; }
    if store.describe_table(ROLES_TABLE)?.item_count == 0 {
        for (role, perms) in DEFAULT_ROLES {
            put_role(store, role, perms)?;
        }
        info!(target: "startup", roles = DEFAULT_ROLES.len(), "seeded default roles");
    }
    if store.describe_table(USERS_TABLE)?.item_count == 0 {
        put_user(store, "admin", admin_password, "admin")?;
        info!(target: "startup", "seeded default admin user");
    }
    let roles = validate_roles_table(store).context("roles table holds an invalid role")?;
    info!(target: "startup", roles, "roles validated");
    Ok(())
}

/// Role store over the `roles` table. Each lookup is bounded by `timeout`; a lookup
/// that cannot get read access in time reports the store as unavailable.
#[derive(Clone)]
pub struct KvRoleStore {
    store: SharedStore,
    timeout: Duration,
}

impl std::fmt::Debug for KvRoleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvRoleStore").field("timeout", &self.timeout).finish()
    }
}

impl KvRoleStore {
    pub fn new(store: SharedStore, timeout: Duration) -> Self { Self { store, timeout } }
}

impl RoleStore for KvRoleStore {
    fn get_permissions(&self, role: &str) -> Result<Option<Vec<String>>, RoleStoreError> {
        let item = match self.store.get_item_within(ROLES_TABLE, &key(ROLES_KEY, role), self.timeout) {
            Ok(item) => item,
            Err(StoreError::NoSuchTable(t)) => return Err(RoleStoreError::Unavailable(format!("table '{}' missing", t))),
            Err(e) => return Err(RoleStoreError::Unavailable(e.to_string())),
        };
        let Some(item) = item else { return Ok(None); };
        let perms = match item.get(PERMISSIONS_ATTR) {
            Some(JsonValue::Array(xs)) => xs.iter().map(|x| x.as_str().map(str::to_string).unwrap_or_else(|| x.to_string())).collect(),
            Some(JsonValue::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        };
        Ok(Some(perms))
    }
}
