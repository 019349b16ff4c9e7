//! Guarded execution: one gate decision per request, then dispatch.
//! Both the HTTP handlers and the local CLI go through [`execute`].

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::authz::{Authorizer, ClassifyError, Operation, RoleStore, Verdict};
use crate::error::{AppError, AppResult};
use crate::identity::Principal;
use crate::security::{USERS_KEY, USERS_TABLE};
use crate::storage::ops::{dispatch, StoreRequest};
use crate::storage::{attr, SharedStore};

/// Gate decision for `op` as described by `req`. Batch requests must be allowed on every
/// table they name.
pub fn authorize_request<S: RoleStore>(
    authorizer: &Authorizer<S>,
    principal: &Principal,
    op: Operation,
    req: &StoreRequest,
) -> Result<Verdict, ClassifyError> {
    let targets = req.targets(op);
    if op.is_batch() {
        authorizer.authorize_all(principal, op, targets.iter().map(String::as_str))
    } else {
        authorizer.authorize_operation(principal, op, targets.first().map(String::as_str))
    }
}

pub fn execute<S: RoleStore>(
    authorizer: &Authorizer<S>,
    store: &SharedStore,
    principal: &Principal,
    op: Operation,
    req: &StoreRequest,
) -> AppResult<JsonValue> {
    let verdict = authorize_request(authorizer, principal, op, req)?;
    if let Some(err) = AppError::from_denial(&verdict) {
        return Err(err);
    }
    debug!(target: "kvguard::exec", user = %principal.identity, operation = %op, permission = %verdict.permission(), "dispatch");
    Ok(dispatch(store, op, req)?)
}

fn username_of(v: &JsonValue) -> Option<String> {
    let item = attr::plain_item(v.as_object()?.clone());
    item.get(USERS_KEY)?.as_str().map(str::to_string)
}

fn is_users_table(name: &str) -> bool { name.trim().eq_ignore_ascii_case(USERS_TABLE) }

/// Usernames whose `users` row `op` writes. Their open sessions carry a stale role once
/// the write succeeds.
pub fn affected_users(op: Operation, req: &StoreRequest) -> Vec<String> {
    let mut names: Vec<String> = match op {
        Operation::PutItem | Operation::UpdateItem | Operation::DeleteItem => {
            if !req.table_name.as_deref().is_some_and(is_users_table) { return Vec::new(); }
            [req.item.as_ref(), req.key.as_ref()]
                .into_iter()
                .flatten()
                .filter_map(|i| username_of(&JsonValue::Object(i.clone())))
                .collect()
        }
        Operation::BatchWriteItem => req
            .request_items
            .as_ref()
            .and_then(|v| v.as_object())
            .into_iter()
            .flatten()
            .filter(|(table, _)| is_users_table(table))
            .filter_map(|(_, writes)| writes.as_array())
            .flatten()
            .filter_map(|w| w.as_object())
            .flat_map(|w| w.values())
            .filter_map(|body| {
                let inner = body.as_object().and_then(|b| ["Item", "item", "Key", "key"].iter().find_map(|k| b.get(*k)));
                username_of(inner.unwrap_or(body))
            })
            .collect(),
        _ => Vec::new(),
    };
    names.sort();
    names.dedup();
    names
}
