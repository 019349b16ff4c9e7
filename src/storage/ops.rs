//! Request shape shared by the HTTP API and the CLI, and the dispatcher that runs an
//! already-authorized operation against the store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use super::{attr, Item, SharedStore, StoreError, StoreResult};
use crate::authz::Operation;
use crate::security;

/// Arguments of one store operation. Which fields are read depends on the operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<Item>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<Item>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Item>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_condition: Option<Item>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_items: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_attribute: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl StoreRequest {
    pub fn for_table(table: impl Into<String>) -> Self { Self { table_name: Some(table.into()), ..Default::default() } }

    /// Resources the operation touches, lower-cased. Batch operations name their tables
    /// in `request_items`; everything else uses `table_name`.
    pub fn targets(&self, op: Operation) -> Vec<String> {
        if op.is_batch() {
            let mut names: Vec<String> = self
                .request_items
                .as_ref()
                .and_then(|v| v.as_object())
                .map(|m| m.keys().map(|k| k.trim().to_ascii_lowercase()).collect())
                .unwrap_or_default();
            names.sort();
            names.dedup();
            return names;
        }
        self.table_name
            .as_deref()
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .into_iter()
            .collect()
    }

    fn table(&self) -> StoreResult<&str> {
        self.table_name
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| StoreError::InvalidArgument("table_name is required".into()))
    }

    fn required_item<'a>(field: &'a Option<Item>, name: &str) -> StoreResult<&'a Item> {
        field.as_ref().ok_or_else(|| StoreError::InvalidArgument(format!("{} is required", name)))
    }
}

fn lookup<'a>(obj: &'a serde_json::Map<String, JsonValue>, names: &[&str]) -> Option<&'a JsonValue> {
    names.iter().find_map(|n| obj.get(*n))
}

fn as_item(v: &JsonValue, what: &str) -> StoreResult<Item> {
    v.as_object()
        .cloned()
        .map(attr::plain_item)
        .ok_or_else(|| StoreError::InvalidArgument(format!("{} must be an object", what)))
}

fn request_items(req: &StoreRequest) -> StoreResult<&serde_json::Map<String, JsonValue>> {
    req.request_items
        .as_ref()
        .and_then(|v| v.as_object())
        .filter(|m| !m.is_empty())
        .ok_or_else(|| StoreError::InvalidArgument("request_items must be a non-empty object".into()))
}

fn batch_get(store: &SharedStore, req: &StoreRequest) -> StoreResult<JsonValue> {
    let mut responses: BTreeMap<String, Vec<Item>> = BTreeMap::new();
    for (table, spec) in request_items(req)? {
        // either {"Keys": [...]} or a bare list of keys
        let keys = match spec {
            JsonValue::Array(xs) => xs,
            JsonValue::Object(o) => lookup(o, &["Keys", "keys"]).and_then(|k| k.as_array()).ok_or_else(|| {
                StoreError::InvalidArgument(format!("request_items.{} needs a Keys list", table))
            })?,
            _ => return Err(StoreError::InvalidArgument(format!("request_items.{} is malformed", table))),
        };
        let found = responses.entry(table.to_ascii_lowercase()).or_default();
        for k in keys {
            if let Some(item) = store.get_item(table, &as_item(k, "key")?)? { found.push(item); }
        }
    }
    Ok(json!({ "responses": responses }))
}

enum Write {
    Put(Item),
    Delete(Item),
}

/// Rows headed for the `roles` table must carry well-formed permissions.
fn check_role_row(table: &str, item: &Item) -> StoreResult<()> {
    if security::is_roles_table(table) { security::validate_role_item(item)?; }
    Ok(())
}

fn batch_write(store: &SharedStore, req: &StoreRequest) -> StoreResult<JsonValue> {
    // decode and check everything first so a bad entry leaves the store untouched
    let mut planned: Vec<(&str, Write)> = Vec::new();
    for (table, writes) in request_items(req)? {
        let writes = writes
            .as_array()
            .ok_or_else(|| StoreError::InvalidArgument(format!("request_items.{} must be a list", table)))?;
        for w in writes {
            let w = w.as_object().ok_or_else(|| StoreError::InvalidArgument("write request must be an object".into()))?;
            if let Some(put) = lookup(w, &["PutRequest", "put_request", "put"]) {
                let item = as_item(put.as_object().and_then(|p| lookup(p, &["Item", "item"])).unwrap_or(put), "item")?;
                check_role_row(table, &item)?;
                planned.push((table.as_str(), Write::Put(item)));
            } else if let Some(del) = lookup(w, &["DeleteRequest", "delete_request", "delete"]) {
                let key = del.as_object().and_then(|d| lookup(d, &["Key", "key"])).unwrap_or(del);
                planned.push((table.as_str(), Write::Delete(as_item(key, "key")?)));
            } else {
                return Err(StoreError::InvalidArgument("write request needs PutRequest or DeleteRequest".into()));
            }
        }
    }
    let processed = planned.len();
    for (table, write) in planned {
        match write {
            Write::Put(item) => { store.put_item(table, item)?; }
            Write::Delete(key) => { store.delete_item(table, &key)?; }
        }
    }
    Ok(json!({ "processed": processed }))
}

/// Execute `op`. Callers must have obtained an allowed verdict first.
pub fn dispatch(store: &SharedStore, op: Operation, req: &StoreRequest) -> StoreResult<JsonValue> {
    let plain = |field: &Option<Item>, name: &str| StoreRequest::required_item(field, name).map(|i| attr::plain_item(i.clone()));
    match op {
        Operation::GetItem => {
            let item = store.get_item(req.table()?, &plain(&req.key, "key")?)?;
            Ok(json!({ "item": item }))
        }
        Operation::PutItem => {
            let mut item = plain(&req.item, "item").or_else(|_| plain(&req.key, "item"))?;
            // the HTTP item endpoints send {key, attributes}
            if req.item.is_none() {
                if let Some(extra) = &req.attributes { item.extend(attr::plain_item(extra.clone())); }
            }
            check_role_row(req.table()?, &item)?;
            let previous = store.put_item(req.table()?, item)?;
            Ok(json!({ "status": "ok", "replaced": previous.is_some() }))
        }
        Operation::UpdateItem => {
            let attributes = req.attributes.clone().map(attr::plain_item).unwrap_or_default();
            let key = plain(&req.key, "key")?;
            let mut changed = key.clone();
            changed.extend(attributes.clone());
            check_role_row(req.table()?, &changed)?;
            let item = store.update_item(req.table()?, &key, attributes)?;
            Ok(json!({ "item": item }))
        }
        Operation::DeleteItem => {
            let removed = store.delete_item(req.table()?, &plain(&req.key, "key")?)?;
            Ok(json!({ "deleted": removed.is_some() }))
        }
        Operation::Query => {
            let conditions = req.key_condition.clone().or_else(|| req.key.clone()).map(attr::plain_item).unwrap_or_default();
            let items = store.query(req.table()?, &conditions)?;
            Ok(json!({ "count": items.len(), "items": items }))
        }
        Operation::Scan => {
            let items = store.scan(req.table()?, req.limit)?;
            Ok(json!({ "count": items.len(), "items": items }))
        }
        Operation::BatchGetItem => batch_get(store, req),
        Operation::BatchWriteItem => batch_write(store, req),
        Operation::CreateTable => {
            let key_attr = req.key_attribute.as_deref().unwrap_or("id");
            let desc = store.create_table(req.table()?, key_attr, req.description.clone())?;
            Ok(json!({ "table": desc }))
        }
        Operation::DescribeTable => Ok(json!({ "table": store.describe_table(req.table()?)? })),
        Operation::ListTables => Ok(json!({ "tables": store.list_tables() })),
        Operation::UpdateTable => Ok(json!({ "table": store.update_table(req.table()?, req.description.clone())? })),
        Operation::DeleteTable => Ok(json!({ "table": store.delete_table(req.table()?)? })),
    }
}
