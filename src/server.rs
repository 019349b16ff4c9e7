//!
//! kvguard HTTP server
//! -------------------
//! Axum-based HTTP API in front of the table store.
//!
//! Responsibilities:
//! - Bearer-token sessions: `/login`, `/logout`, `/users/me`.
//! - Item proxy endpoints under `/api/{table}/item`.
//! - Generic operation endpoint `/api/ops/{operation}` covering every store operation.
//! - Exactly one gate decision per data-plane request, before anything touches the store.
//! - First-run bootstrap of the `users`/`roles` tables and optional snapshot load/save.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use anyhow::Context;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tokio::net::TcpListener;
use tracing::{info, info_span, warn, Instrument};

use crate::authz::{Authorizer, Operation};
use crate::config::ServerConfig;
use crate::error::{AppError, AppResult};
use crate::identity::{self, AuthProvider, LoginRequest, Principal, RequestContext, SessionManager, StoreAuthProvider};
use crate::security::{self, KvRoleStore};
use crate::storage::ops::StoreRequest;
use crate::storage::{Item, SharedStore};

pub mod exec;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub sessions: SessionManager,
    pub auth: Arc<dyn AuthProvider>,
    pub authorizer: Authorizer<KvRoleStore>,
}

impl AppState {
    pub fn new(store: SharedStore, cfg: &ServerConfig) -> Self {
        Self {
            auth: Arc::new(StoreAuthProvider::new(store.clone())),
            authorizer: Authorizer::new(KvRoleStore::new(store.clone(), cfg.role_lookup_timeout)),
            sessions: SessionManager::new(cfg.session_ttl),
            store,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "ok"})) }))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/users/me", get(me))
        .route("/api/ops/{operation}", post(run_operation))
        .route("/api/{table}/item", get(get_item).post(put_item).put(update_item).delete(delete_item))
        .with_state(state)
}

/// Serve on an already-bound listener. Tests bind `127.0.0.1:0` and pass it in.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Open the store, bootstrap RBAC tables, and serve until ctrl-c.
pub async fn run(cfg: ServerConfig) -> anyhow::Result<()> {
    let store = SharedStore::new();
    if let Some(path) = &cfg.snapshot {
        if path.exists() {
            let n = store.load_snapshot(path).with_context(|| format!("loading snapshot {}", path.display()))?;
            info!(target: "startup", tables = n, path = %path.display(), "snapshot loaded");
        } else {
            warn!(target: "startup", path = %path.display(), "snapshot file not found; starting empty");
        }
    }
    security::ensure_security_tables(&store, &cfg.admin_password).context("bootstrapping users/roles tables")?;
    info!(target: "startup", tables = ?store.list_tables(), "store ready");

    let state = AppState::new(store.clone(), &cfg);
    let listener = TcpListener::bind(cfg.addr()).await.with_context(|| format!("binding {}", cfg.addr()))?;
    info!(target: "startup", "Starting server on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    if cfg.save_on_exit {
        if let Some(path) = &cfg.snapshot {
            store.save_snapshot(path).with_context(|| format!("saving snapshot {}", path.display()))?;
            info!(target: "startup", path = %path.display(), "snapshot saved");
        }
    }
    Ok(())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = raw.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") { return None; }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn principal_from_headers(state: &AppState, headers: &HeaderMap) -> AppResult<Principal> {
    let token = bearer_token(headers).ok_or_else(|| AppError::auth("missing_token", "missing bearer token"))?;
    state.sessions.validate(token).ok_or_else(|| AppError::auth("invalid_token", "invalid or expired token"))
}

/// Gate and dispatch off the async executor; role lookups may block up to the lookup timeout.
/// A successful write to `users` ends the sessions of every user it touched.
async fn guarded(state: AppState, principal: Principal, op: Operation, req: StoreRequest) -> AppResult<Json<JsonValue>> {
    let ctx = RequestContext::new(principal);
    let span = info_span!(target: "kvguard::http", "request", request_id = %ctx.request_id, user = %ctx.principal.identity, operation = %op);
    let sessions = state.sessions.clone();
    let affected = exec::affected_users(op, &req);
    async move {
        let out = tokio::task::spawn_blocking(move || exec::execute(&state.authorizer, &state.store, &ctx.principal, op, &req))
            .await
            .map_err(|e| AppError::internal("join_error".to_string(), e.to_string()))??;
        for user in &affected {
            let revoked = sessions.revoke_user(user);
            if revoked > 0 {
                info!(target: "kvguard::auth", user = %user, sessions = revoked, "sessions revoked after users table write");
            }
        }
        Ok(Json(out))
    }
    .instrument(span)
    .await
}

#[derive(Debug, Deserialize)]
struct LoginPayload { username: String, password: String }

async fn login(State(state): State<AppState>, Json(payload): Json<LoginPayload>) -> AppResult<Json<JsonValue>> {
    let req = LoginRequest { username: payload.username, password: payload.password };
    let (auth, sessions) = (state.auth.clone(), state.sessions.clone());
    // argon2 verification is CPU bound
    let resp = tokio::task::spawn_blocking(move || identity::login(auth.as_ref(), &sessions, &req))
        .await
        .map_err(|e| AppError::internal("join_error".to_string(), e.to_string()))??;
    Ok(Json(json!({
        "access_token": resp.session.token,
        "token_type": "bearer",
        "expires_in": resp.session.expires_in().as_secs(),
    })))
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<JsonValue>> {
    let token = bearer_token(&headers).ok_or_else(|| AppError::auth("missing_token", "missing bearer token"))?;
    if !state.sessions.logout(token) {
        return Err(AppError::auth("invalid_token", "invalid or expired token"));
    }
    Ok(Json(json!({"status": "ok"})))
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<JsonValue>> {
    let p = principal_from_headers(&state, &headers)?;
    Ok(Json(json!({"username": p.identity, "role": p.role})))
}

async fn run_operation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(operation): Path<String>,
    body: Option<Json<StoreRequest>>,
) -> AppResult<Json<JsonValue>> {
    let principal = principal_from_headers(&state, &headers)?;
    let op = Operation::from_name(&operation)?;
    let req = body.map(|Json(r)| r).unwrap_or_default();
    guarded(state, principal, op, req).await
}

/// Key from `?key=<attribute>&key_value=<value>`.
fn key_from_query(params: &HashMap<String, String>) -> AppResult<Item> {
    let attr = params.get("key").filter(|s| !s.is_empty()).ok_or_else(|| AppError::user("missing_key", "query parameter 'key' is required"))?;
    let value = params.get("key_value").ok_or_else(|| AppError::user("missing_key", "query parameter 'key_value' is required"))?;
    let mut key = Item::new();
    key.insert(attr.clone(), JsonValue::String(value.clone()));
    Ok(key)
}

#[derive(Debug, Deserialize)]
struct ItemBody {
    key: Item,
    #[serde(default)]
    attributes: Option<Item>,
}

async fn get_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<JsonValue>> {
    let principal = principal_from_headers(&state, &headers)?;
    let req = StoreRequest { key: Some(key_from_query(&params)?), ..StoreRequest::for_table(table) };
    let out = guarded(state, principal, Operation::GetItem, req).await?;
    if matches!(out.0.get("item"), None | Some(JsonValue::Null)) {
        return Err(AppError::not_found("item_not_found", "item not found"));
    }
    Ok(out)
}

async fn delete_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<JsonValue>> {
    let principal = principal_from_headers(&state, &headers)?;
    let req = StoreRequest { key: Some(key_from_query(&params)?), ..StoreRequest::for_table(table) };
    guarded(state, principal, Operation::DeleteItem, req).await
}

async fn put_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(table): Path<String>,
    Json(body): Json<ItemBody>,
) -> AppResult<Json<JsonValue>> {
    let principal = principal_from_headers(&state, &headers)?;
    let req = StoreRequest { key: Some(body.key), attributes: body.attributes, ..StoreRequest::for_table(table) };
    guarded(state, principal, Operation::PutItem, req).await
}

async fn update_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(table): Path<String>,
    Json(body): Json<ItemBody>,
) -> AppResult<Json<JsonValue>> {
    let principal = principal_from_headers(&state, &headers)?;
    let req = StoreRequest { key: Some(body.key), attributes: body.attributes, ..StoreRequest::for_table(table) };
    guarded(state, principal, Operation::UpdateItem, req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_parsing() {
        let mut h = HeaderMap::new();
        assert_eq!(bearer_token(&h), None);
        h.insert("authorization", HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&h), Some("abc"));
        h.insert("authorization", HeaderValue::from_static("bearer   xyz "));
        assert_eq!(bearer_token(&h), Some("xyz"));
        h.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&h), None);
        h.insert("authorization", HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&h), None);
    }

    #[test]
    fn key_query_requires_both_parts() {
        let mut q = HashMap::new();
        q.insert("key".to_string(), "customer_name".to_string());
        assert!(key_from_query(&q).is_err());
        q.insert("key_value".to_string(), "Bob".to_string());
        assert_eq!(key_from_query(&q).unwrap()["customer_name"], json!("Bob"));
    }
}
