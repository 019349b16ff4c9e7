//!
//! kvguard storage module
//! -----------------------
//! In-memory table store sitting behind the authorization gate. Each named table has
//! a key attribute; items are JSON objects indexed by the value of that attribute.
//!
//! The store is an opaque backend from the gate's point of view. Front-ends reach it
//! through [`ops::dispatch`] only after a request has been allowed; the dispatcher also
//! refuses `roles` rows whose permissions do not parse.
//!
//! Tables and items can be loaded from and written to a JSON snapshot so operators can
//! prepare data for local CLI sessions.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

pub mod attr;
pub mod ops;

pub type Item = serde_json::Map<String, JsonValue>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("table '{0}' does not exist")]
    NoSuchTable(String),
    #[error("table '{0}' already exists")]
    TableExists(String),
    #[error("item not found in table '{0}'")]
    NoSuchItem(String),
    #[error("missing key attribute '{attribute}' for table '{table}'")]
    MissingKey { table: String, attribute: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("store busy: {0}")]
    Busy(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Per-table settings. Mutable through update-table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSettings {
    pub name: String,
    pub key_attribute: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescription {
    pub name: String,
    pub key_attribute: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub item_count: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct Table {
    settings: TableSettings,
    items: BTreeMap<String, Item>,
}

impl Default for TableSettings {
    fn default() -> Self { Self { name: String::new(), key_attribute: "id".into(), description: None } }
}

impl Table {
    fn describe(&self) -> TableDescription {
        TableDescription {
            name: self.settings.name.clone(),
            key_attribute: self.settings.key_attribute.clone(),
            description: self.settings.description.clone(),
            item_count: self.items.len(),
        }
    }

    /// Index value of the key attribute in `key` (or a full item).
    fn key_of(&self, key: &Item) -> StoreResult<String> {
        let attr = &self.settings.key_attribute;
        match key.get(attr) {
            Some(JsonValue::Null) | None => Err(StoreError::MissingKey { table: self.settings.name.clone(), attribute: attr.clone() }),
            Some(JsonValue::String(s)) => Ok(s.clone()),
            Some(other) => Ok(other.to_string()),
        }
    }
}

/// On-disk snapshot layout: table name -> settings + items.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub tables: Vec<SnapshotTable>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotTable {
    #[serde(flatten)]
    pub settings: TableSettings,
    #[serde(default)]
    pub items: Vec<Item>,
}

fn normalize_table_name(name: &str) -> StoreResult<String> {
    let n = name.trim().to_ascii_lowercase();
    if n.is_empty() { return Err(StoreError::InvalidArgument("table name must not be empty".into())); }
    Ok(n)
}

/// Thread-safe handle to the table store. Clones share the same tables.
#[derive(Clone, Default)]
pub struct SharedStore(pub(crate) Arc<RwLock<HashMap<String, Table>>>);

impl SharedStore {
    pub fn new() -> Self { Self::default() }

    /// Read access bounded by `timeout`. Used by lookups that must not block forever.
    fn read_within(&self, timeout: Duration) -> StoreResult<RwLockReadGuard<'_, HashMap<String, Table>>> {
        self.0.try_read_for(timeout).ok_or_else(|| StoreError::Busy(format!("read lock not acquired within {:?}", timeout)))
    }

    pub fn create_table(&self, name: &str, key_attribute: &str, description: Option<String>) -> StoreResult<TableDescription> {
        let name = normalize_table_name(name)?;
        let key_attribute = key_attribute.trim();
        if key_attribute.is_empty() { return Err(StoreError::InvalidArgument("key attribute must not be empty".into())); }
        let mut w = self.0.write();
        if w.contains_key(&name) { return Err(StoreError::TableExists(name)); }
        let table = Table {
            settings: TableSettings { name: name.clone(), key_attribute: key_attribute.to_string(), description },
            items: BTreeMap::new(),
        };
        let desc = table.describe();
        w.insert(name, table);
        debug!(table = %desc.name, key = %desc.key_attribute, "create_table");
        Ok(desc)
    }

    pub fn table_exists(&self, name: &str) -> bool {
        normalize_table_name(name).map(|n| self.0.read().contains_key(&n)).unwrap_or(false)
    }

    pub fn describe_table(&self, name: &str) -> StoreResult<TableDescription> {
        let name = normalize_table_name(name)?;
        let r = self.0.read();
        r.get(&name).map(Table::describe).ok_or(StoreError::NoSuchTable(name))
    }

    pub fn list_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.0.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn update_table(&self, name: &str, description: Option<String>) -> StoreResult<TableDescription> {
        let name = normalize_table_name(name)?;
        let mut w = self.0.write();
        let table = w.get_mut(&name).ok_or_else(|| StoreError::NoSuchTable(name.clone()))?;
        table.settings.description = description;
        Ok(table.describe())
    }

    pub fn delete_table(&self, name: &str) -> StoreResult<TableDescription> {
        let name = normalize_table_name(name)?;
        let removed = self.0.write().remove(&name).ok_or_else(|| StoreError::NoSuchTable(name.clone()))?;
        debug!(table = %name, items = removed.items.len(), "delete_table");
        Ok(removed.describe())
    }

    pub fn get_item(&self, table: &str, key: &Item) -> StoreResult<Option<Item>> {
        let table = normalize_table_name(table)?;
        let r = self.0.read();
        let t = r.get(&table).ok_or_else(|| StoreError::NoSuchTable(table.clone()))?;
        let k = t.key_of(key)?;
        Ok(t.items.get(&k).cloned())
    }

    /// Like [`get_item`](Self::get_item) but gives up after `timeout` if writers hold the lock.
    pub fn get_item_within(&self, table: &str, key: &Item, timeout: Duration) -> StoreResult<Option<Item>> {
        let table = normalize_table_name(table)?;
        let r = self.read_within(timeout)?;
        let t = r.get(&table).ok_or_else(|| StoreError::NoSuchTable(table.clone()))?;
        let k = t.key_of(key)?;
        Ok(t.items.get(&k).cloned())
    }

    /// Insert or replace an item. Returns the previous item, if any.
    pub fn put_item(&self, table: &str, item: Item) -> StoreResult<Option<Item>> {
        let table = normalize_table_name(table)?;
        let mut w = self.0.write();
        let t = w.get_mut(&table).ok_or_else(|| StoreError::NoSuchTable(table.clone()))?;
        let k = t.key_of(&item)?;
        Ok(t.items.insert(k, item))
    }

    /// Merge `attributes` into an existing item. The key attribute cannot be changed.
    pub fn update_item(&self, table: &str, key: &Item, attributes: Item) -> StoreResult<Item> {
        let table = normalize_table_name(table)?;
        let mut w = self.0.write();
        let t = w.get_mut(&table).ok_or_else(|| StoreError::NoSuchTable(table.clone()))?;
        let k = t.key_of(key)?;
        let key_attr = t.settings.key_attribute.clone();
        let item = t.items.get_mut(&k).ok_or_else(|| StoreError::NoSuchItem(table.clone()))?;
        for (name, value) in attributes {
            if name == key_attr { continue; }
            item.insert(name, value);
        }
        Ok(item.clone())
    }

    pub fn delete_item(&self, table: &str, key: &Item) -> StoreResult<Option<Item>> {
        let table = normalize_table_name(table)?;
        let mut w = self.0.write();
        let t = w.get_mut(&table).ok_or_else(|| StoreError::NoSuchTable(table.clone()))?;
        let k = t.key_of(key)?;
        Ok(t.items.remove(&k))
    }

    /// Items whose attributes equal every condition.
    pub fn query(&self, table: &str, conditions: &Item) -> StoreResult<Vec<Item>> {
        let table = normalize_table_name(table)?;
        let r = self.0.read();
        let t = r.get(&table).ok_or_else(|| StoreError::NoSuchTable(table.clone()))?;
        Ok(t.items
            .values()
            .filter(|item| conditions.iter().all(|(k, v)| item.get(k) == Some(v)))
            .cloned()
            .collect())
    }

    pub fn scan(&self, table: &str, limit: Option<usize>) -> StoreResult<Vec<Item>> {
        let table = normalize_table_name(table)?;
        let r = self.0.read();
        let t = r.get(&table).ok_or_else(|| StoreError::NoSuchTable(table.clone()))?;
        Ok(t.items.values().take(limit.unwrap_or(usize::MAX)).cloned().collect())
    }

    pub fn load_snapshot(&self, path: &Path) -> anyhow::Result<usize> {
        let bytes = std::fs::read(path)?;
        let snap: Snapshot = serde_json::from_slice(&bytes)?;
        let mut loaded = 0usize;
        let mut w = self.0.write();
        for st in snap.tables {
            let name = normalize_table_name(&st.settings.name)?;
            let mut table = Table { settings: TableSettings { name: name.clone(), ..st.settings }, items: BTreeMap::new() };
            for item in st.items {
                let item = attr::plain_item(item);
                let k = table.key_of(&item)?;
                table.items.insert(k, item);
                loaded += 1;
            }
            w.insert(name, table);
        }
        Ok(loaded)
    }

    pub fn save_snapshot(&self, path: &Path) -> anyhow::Result<()> {
        let r = self.0.read();
        let mut names: Vec<&String> = r.keys().collect();
        names.sort();
        let tables = names
            .into_iter()
            .filter_map(|n| r.get(n))
            .map(|t| SnapshotTable { settings: t.settings.clone(), items: t.items.values().cloned().collect() })
            .collect();
        let snap = Snapshot { tables };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).with_context(|| format!("creating snapshot directory {}", dir.display()))?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(&snap)?).with_context(|| format!("writing snapshot {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod storage_tests;
