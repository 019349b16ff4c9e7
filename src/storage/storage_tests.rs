use super::ops::{dispatch, StoreRequest};
use super::*;
use crate::authz::Operation;
use serde_json::json;

fn obj(v: JsonValue) -> Item { v.as_object().cloned().unwrap() }

fn customer_store() -> SharedStore {
    let store = SharedStore::new();
    store.create_table("customer", "customer_name", None).unwrap();
    store.put_item("customer", obj(json!({"customer_name": "Bob", "customer_city": "Lisbon"}))).unwrap();
    store.put_item("customer", obj(json!({"customer_name": "Ana", "customer_city": "Porto"}))).unwrap();
    store
}

#[test]
fn table_lifecycle() {
    let store = SharedStore::new();
    let desc = store.create_table("Orders", "order_id", Some("sales".into())).unwrap();
    assert_eq!(desc.name, "orders");
    assert_eq!(store.create_table("orders", "order_id", None), Err(StoreError::TableExists("orders".into())));
    assert_eq!(store.list_tables(), vec!["orders".to_string()]);
    let desc = store.update_table("orders", Some("archive".into())).unwrap();
    assert_eq!(desc.description.as_deref(), Some("archive"));
    store.delete_table("orders").unwrap();
    assert!(!store.table_exists("orders"));
    assert_eq!(store.describe_table("orders"), Err(StoreError::NoSuchTable("orders".into())));
}

#[test]
fn item_crud() {
    let store = customer_store();
    let key = obj(json!({"customer_name": "Bob"}));
    assert_eq!(store.get_item("customer", &key).unwrap().unwrap()["customer_city"], json!("Lisbon"));
    let updated = store.update_item("customer", &key, obj(json!({"customer_city": "Faro", "customer_name": "Mallory"}))).unwrap();
    assert_eq!(updated["customer_city"], json!("Faro"));
    // key attribute is not rewritten
    assert_eq!(updated["customer_name"], json!("Bob"));
    assert!(store.delete_item("customer", &key).unwrap().is_some());
    assert!(store.get_item("customer", &key).unwrap().is_none());
    assert_eq!(
        store.update_item("customer", &key, Item::new()),
        Err(StoreError::NoSuchItem("customer".into()))
    );
}

#[test]
fn missing_key_attribute_is_rejected() {
    let store = customer_store();
    let err = store.put_item("customer", obj(json!({"city": "x"}))).unwrap_err();
    assert!(matches!(err, StoreError::MissingKey { .. }));
}

#[test]
fn query_and_scan() {
    let store = customer_store();
    let hits = store.query("customer", &obj(json!({"customer_city": "Porto"}))).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["customer_name"], json!("Ana"));
    assert_eq!(store.scan("customer", None).unwrap().len(), 2);
    assert_eq!(store.scan("customer", Some(1)).unwrap().len(), 1);
}

#[test]
fn dispatch_accepts_typed_attributes() {
    let store = customer_store();
    let req = StoreRequest {
        key: Some(obj(json!({"customer_name": {"S": "Bob"}}))),
        ..StoreRequest::for_table("customer")
    };
    let out = dispatch(&store, Operation::GetItem, &req).unwrap();
    assert_eq!(out["item"]["customer_city"], json!("Lisbon"));
}

#[test]
fn dispatch_put_merges_key_and_attributes() {
    let store = customer_store();
    let req = StoreRequest {
        key: Some(obj(json!({"customer_name": "Zed"}))),
        attributes: Some(obj(json!({"customer_city": "Braga"}))),
        ..StoreRequest::for_table("customer")
    };
    dispatch(&store, Operation::PutItem, &req).unwrap();
    let item = store.get_item("customer", &obj(json!({"customer_name": "Zed"}))).unwrap().unwrap();
    assert_eq!(item["customer_city"], json!("Braga"));
}

#[test]
fn dispatch_batches() {
    let store = customer_store();
    let write = StoreRequest {
        request_items: Some(json!({"customer": [
            {"PutRequest": {"Item": {"customer_name": {"S": "Cid"}, "customer_city": {"S": "Evora"}}}},
            {"DeleteRequest": {"Key": {"customer_name": {"S": "Ana"}}}}
        ]})),
        ..Default::default()
    };
    assert_eq!(dispatch(&store, Operation::BatchWriteItem, &write).unwrap()["processed"], json!(2));
    let read = StoreRequest {
        request_items: Some(json!({"customer": {"Keys": [{"customer_name": {"S": "Cid"}}, {"customer_name": "Ana"}]}})),
        ..Default::default()
    };
    let out = dispatch(&store, Operation::BatchGetItem, &read).unwrap();
    assert_eq!(out["responses"]["customer"].as_array().unwrap().len(), 1);
}

#[test]
fn targets_for_classification() {
    let req = StoreRequest::for_table(" Customer ");
    assert_eq!(req.targets(Operation::GetItem), vec!["customer".to_string()]);
    let batch = StoreRequest { request_items: Some(json!({"Orders": [], "customer": []})), ..Default::default() };
    assert_eq!(batch.targets(Operation::BatchWriteItem), vec!["customer".to_string(), "orders".to_string()]);
    assert!(StoreRequest::default().targets(Operation::ListTables).is_empty());
}

#[test]
fn dispatch_admin_operations() {
    let store = SharedStore::new();
    let create = StoreRequest { key_attribute: Some("sku".into()), ..StoreRequest::for_table("products") };
    let out = dispatch(&store, Operation::CreateTable, &create).unwrap();
    assert_eq!(out["table"]["key_attribute"], json!("sku"));
    let out = dispatch(&store, Operation::ListTables, &StoreRequest::default()).unwrap();
    assert_eq!(out["tables"], json!(["products"]));
    let err = dispatch(&store, Operation::DescribeTable, &StoreRequest::default()).unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)));
}

#[test]
fn snapshot_round_trip_through_disk() {
    let store = customer_store();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snap.json");
    store.save_snapshot(&path).unwrap();
    let other = SharedStore::new();
    assert_eq!(other.load_snapshot(&path).unwrap(), 2);
    assert_eq!(other.describe_table("customer").unwrap().item_count, 2);
}

#[test]
fn bounded_read_gives_up_under_writer() {
    let store = customer_store();
    let key = obj(json!({"customer_name": "Bob"}));
    let _w = store.0.write();
    let err = store.get_item_within("customer", &key, std::time::Duration::from_millis(20)).unwrap_err();
    assert!(matches!(err, StoreError::Busy(_)));
}

fn roles_store() -> SharedStore {
    let store = SharedStore::new();
    crate::security::ensure_security_tables(&store, "pw").unwrap();
    store
}

#[test]
fn dispatch_refuses_malformed_role_rows() {
    let store = roles_store();
    let bad = obj(json!({"role_name": "reader", "permissions": ["customer:", "fly"]}));
    let put = StoreRequest { item: Some(bad.clone()), ..StoreRequest::for_table("Roles") };
    assert!(matches!(dispatch(&store, Operation::PutItem, &put), Err(StoreError::InvalidArgument(_))));

    let upd = StoreRequest {
        key: Some(obj(json!({"role_name": "reader"}))),
        attributes: Some(obj(json!({"permissions": ["read:"]}))),
        ..StoreRequest::for_table("roles")
    };
    assert!(matches!(dispatch(&store, Operation::UpdateItem, &upd), Err(StoreError::InvalidArgument(_))));

    let batch = StoreRequest {
        request_items: Some(json!({"roles": [
            {"PutRequest": {"Item": {"role_name": "auditor", "permissions": ["read"]}}},
            {"PutRequest": {"Item": bad}}
        ]})),
        ..Default::default()
    };
    assert!(matches!(dispatch(&store, Operation::BatchWriteItem, &batch), Err(StoreError::InvalidArgument(_))));
    // nothing from the rejected batch landed
    assert_eq!(store.describe_table("roles").unwrap().item_count, 3);
    assert_eq!(crate::security::validate_roles_table(&store), Ok(3));

    let good = StoreRequest {
        item: Some(obj(json!({"role_name": "auditor", "permissions": ["*:read", "orders:*"]}))),
        ..StoreRequest::for_table("roles")
    };
    assert!(dispatch(&store, Operation::PutItem, &good).is_ok());
}

#[test]
fn snapshot_with_malformed_role_fails_bootstrap() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snap.json");
    let source = roles_store();
    source.put_item("roles", obj(json!({"role_name": "broken", "permissions": ["customer:"]}))).unwrap();
    source.save_snapshot(&path).unwrap();

    let store = SharedStore::new();
    store.load_snapshot(&path).unwrap();
    assert!(crate::security::ensure_security_tables(&store, "pw").is_err());
}

#[test]
fn snapshot_save_reports_unusable_directory() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("plain-file");
    std::fs::write(&blocker, b"x").unwrap();
    let err = customer_store().save_snapshot(&blocker.join("snap.json")).unwrap_err();
    assert!(format!("{:#}", err).contains("creating snapshot directory"));
}
