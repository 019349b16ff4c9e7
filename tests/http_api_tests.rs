//! HTTP API integration tests: bearer sessions, item endpoints, the generic operation
//! endpoint, and how gate verdicts surface as status codes.

use std::time::Duration;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

use kvguard::config::ServerConfig;
use kvguard::security;
use kvguard::server::{self, AppState};
use kvguard::storage::SharedStore;

struct TestServer {
    base: String,
    store: SharedStore,
    client: reqwest::Client,
}

async fn start() -> Result<TestServer> {
    let store = SharedStore::new();
    security::ensure_security_tables(&store, "adminpw")?;
    security::put_user(&store, "rita", "123", "reader")?;
    security::put_user(&store, "will", "456", "writer")?;
    security::put_role(&store, "clerk", &["customer:*"])?;
    security::put_user(&store, "cleo", "789", "clerk")?;
    store.create_table("customer", "customer_name", None)?;

    let cfg = ServerConfig { role_lookup_timeout: Duration::from_millis(100), ..ServerConfig::default() };
    let state = AppState::new(store.clone(), &cfg);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = server::serve(listener, state).await;
    });
    Ok(TestServer { base: format!("http://{}", addr), store, client: reqwest::Client::new() })
}

impl TestServer {
    fn url(&self, path: &str) -> String { format!("{}{}", self.base, path) }

    async fn login(&self, user: &str, pass: &str) -> Result<String> {
        let resp = self.client.post(self.url("/login")).json(&json!({"username": user, "password": pass})).send().await?;
        assert_eq!(resp.status(), StatusCode::OK);
        let v: Value = resp.json().await?;
        assert_eq!(v["token_type"], json!("bearer"));
        assert!(v["expires_in"].as_u64().unwrap() > 0);
        Ok(v["access_token"].as_str().unwrap().to_string())
    }

    async fn op(&self, token: &str, op: &str, body: Value) -> Result<(StatusCode, Value)> {
        let resp = self.client.post(self.url(&format!("/api/ops/{}", op))).bearer_auth(token).json(&body).send().await?;
        let status = resp.status();
        Ok((status, resp.json().await.unwrap_or(Value::Null)))
    }
}

#[tokio::test]
async fn health_and_login() -> Result<()> {
    let srv = start().await?;
    let resp = srv.client.get(srv.url("/health")).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let bad = srv.client.post(srv.url("/login")).json(&json!({"username": "rita", "password": "nope"})).send().await?;
    assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);
    let unknown = srv.client.post(srv.url("/login")).json(&json!({"username": "ghost", "password": "123"})).send().await?;
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);

    let token = srv.login("rita", "123").await?;
    let me: Value = srv.client.get(srv.url("/users/me")).bearer_auth(&token).send().await?.json().await?;
    assert_eq!(me, json!({"username": "rita", "role": "reader"}));
    Ok(())
}

#[tokio::test]
async fn missing_or_revoked_token_is_unauthorized() -> Result<()> {
    let srv = start().await?;
    let resp = srv.client.get(srv.url("/api/customer/item?key=customer_name&key_value=Bob")).send().await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let resp = srv.client.get(srv.url("/users/me")).bearer_auth("not-a-token").send().await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let token = srv.login("rita", "123").await?;
    let out = srv.client.post(srv.url("/logout")).bearer_auth(&token).send().await?;
    assert_eq!(out.status(), StatusCode::OK);
    let resp = srv.client.get(srv.url("/users/me")).bearer_auth(&token).send().await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn item_endpoints_follow_role_permissions() -> Result<()> {
    let srv = start().await?;
    let writer = srv.login("will", "456").await?;
    let reader = srv.login("rita", "123").await?;
    let body = json!({"key": {"customer_name": "Bob"}, "attributes": {"customer_city": "Lisbon"}});

    let resp = srv.client.post(srv.url("/api/customer/item")).bearer_auth(&reader).json(&body).send().await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let err: Value = resp.json().await?;
    assert_eq!(err["type"], json!("forbidden"));
    assert_eq!(err["message"], json!("user 'rita' (role: reader) lacks required permission 'customer:write'"));
    assert_eq!(srv.store.describe_table("customer")?.item_count, 0);

    let resp = srv.client.post(srv.url("/api/customer/item")).bearer_auth(&writer).json(&body).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let got: Value = srv
        .client
        .get(srv.url("/api/customer/item?key=customer_name&key_value=Bob"))
        .bearer_auth(&reader)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(got["item"]["customer_city"], json!("Lisbon"));

    let upd = json!({"key": {"customer_name": "Bob"}, "attributes": {"customer_city": "Faro"}});
    let resp = srv.client.put(srv.url("/api/customer/item")).bearer_auth(&writer).json(&upd).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = srv.client.delete(srv.url("/api/customer/item?key=customer_name&key_value=Bob")).bearer_auth(&reader).send().await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let resp = srv.client.delete(srv.url("/api/customer/item?key=customer_name&key_value=Bob")).bearer_auth(&writer).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(srv.store.describe_table("customer")?.item_count, 0);

    let resp = srv.client.get(srv.url("/api/customer/item?key=customer_name&key_value=Bob")).bearer_auth(&reader).send().await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let err: Value = resp.json().await?;
    assert_eq!(err["message"], json!("item not found"));
    Ok(())
}

#[tokio::test]
async fn rbac_tables_need_full_wildcard() -> Result<()> {
    let srv = start().await?;
    let writer = srv.login("will", "456").await?;
    let admin = srv.login("admin", "adminpw").await?;

    let (status, _) = srv.op(&writer, "scan", json!({"table_name": "users"})).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = srv.op(&writer, "get-item", json!({"table_name": "roles", "key": {"role_name": "admin"}})).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = srv.op(&admin, "scan", json!({"table_name": "users"})).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["count"].as_u64().unwrap() >= 4);
    Ok(())
}

#[tokio::test]
async fn table_wildcard_and_admin_operations() -> Result<()> {
    let srv = start().await?;
    let clerk = srv.login("cleo", "789").await?;
    let admin = srv.login("admin", "adminpw").await?;

    let (status, _) = srv.op(&clerk, "put-item", json!({"table_name": "customer", "item": {"customer_name": "Ana"}})).await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = srv.op(&clerk, "scan", json!({"table_name": "orders"})).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = srv.op(&clerk, "list-tables", json!({})).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = srv.op(&admin, "create-table", json!({"table_name": "orders", "key_attribute": "order_id"})).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["table"]["name"], json!("orders"));
    let (status, _) = srv.op(&admin, "create-table", json!({"table_name": "orders"})).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, body) = srv.op(&admin, "list-tables", json!({})).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["tables"].as_array().unwrap().contains(&json!("orders")));
    Ok(())
}

#[tokio::test]
async fn caller_errors_are_bad_requests() -> Result<()> {
    let srv = start().await?;
    let reader = srv.login("rita", "123").await?;
    let (status, body) = srv.op(&reader, "teleport", json!({})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("unknown_operation"));
    let (status, body) = srv.op(&reader, "get-item", json!({"key": {"customer_name": "Bob"}})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("missing_target"));
    let (status, _) = srv.op(&reader, "scan", json!({"table_name": "nowhere"})).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn unknown_role_is_a_server_fault() -> Result<()> {
    let srv = start().await?;
    security::put_user(&srv.store, "orphan", "000", "ghost-role")?;
    let token = srv.login("orphan", "000").await?;
    let (status, body) = srv.op(&token, "scan", json!({"table_name": "customer"})).await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], json!("authorization unavailable"));
    Ok(())
}

#[tokio::test]
async fn role_edits_apply_to_open_sessions() -> Result<()> {
    let srv = start().await?;
    let reader = srv.login("rita", "123").await?;
    let put = json!({"table_name": "customer", "item": {"customer_name": "Zed"}});
    let (status, _) = srv.op(&reader, "put-item", put.clone()).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    security::put_role(&srv.store, "reader", &["read", "customer:write"])?;
    let (status, _) = srv.op(&reader, "put-item", put).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn malformed_role_writes_are_rejected() -> Result<()> {
    let srv = start().await?;
    let admin = srv.login("admin", "adminpw").await?;
    let reader = srv.login("rita", "123").await?;

    let bad = json!({"table_name": "roles", "item": {"role_name": "reader", "permissions": ["customer:", "fly"]}});
    let (status, body) = srv.op(&admin, "put-item", bad).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], json!("user_input"));

    let upd = json!({"table_name": "roles", "key": {"role_name": "reader"}, "attributes": {"permissions": [":read"]}});
    let (status, _) = srv.op(&admin, "update-item", upd).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // the reader role is intact and still decides normally
    let (status, _) = srv.op(&reader, "scan", json!({"table_name": "customer"})).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn users_row_edit_ends_open_sessions() -> Result<()> {
    let srv = start().await?;
    let admin = srv.login("admin", "adminpw").await?;
    let reader = srv.login("rita", "123").await?;

    let upd = json!({"table_name": "users", "key": {"username": "rita"}, "attributes": {"role_name": "writer"}});
    let (status, _) = srv.op(&admin, "update-item", upd).await?;
    assert_eq!(status, StatusCode::OK);

    let resp = srv.client.get(srv.url("/users/me")).bearer_auth(&reader).send().await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let fresh = srv.login("rita", "123").await?;
    let me: Value = srv.client.get(srv.url("/users/me")).bearer_auth(&fresh).send().await?.json().await?;
    assert_eq!(me["role"], json!("writer"));
    // the admin's own session is untouched
    let resp = srv.client.get(srv.url("/users/me")).bearer_auth(&admin).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    Ok(())
}
