//! Signed-in client session: one principal, one backend, and the per-line handling shared
//! by the interactive loop and one-shot mode.

use std::time::Duration;

use anyhow::Context;
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use super::connectivity::HttpSession;
use super::{parse_command, render};
use crate::authz::{Authorizer, Operation};
use crate::error::{AppError, AppResult};
use crate::identity::{AuthProvider, LoginRequest, Principal, StoreAuthProvider};
use crate::security::{self, KvRoleStore};
use crate::server::exec;
use crate::storage::ops::StoreRequest;
use crate::storage::SharedStore;

/// In-process store with its own gate.
#[derive(Clone)]
pub struct LocalBackend {
    store: SharedStore,
    authorizer: Authorizer<KvRoleStore>,
    auth: StoreAuthProvider,
}

impl LocalBackend {
    /// Wrap `store`, creating the RBAC tables (with `admin_password`) when missing.
    pub fn new(store: SharedStore, admin_password: &str, role_lookup_timeout: Duration) -> anyhow::Result<Self> {
        security::ensure_security_tables(&store, admin_password).context("bootstrapping users/roles tables")?;
        Ok(Self {
            authorizer: Authorizer::new(KvRoleStore::new(store.clone(), role_lookup_timeout)),
            auth: StoreAuthProvider::new(store.clone()),
            store,
        })
    }

    pub fn store(&self) -> &SharedStore { &self.store }

    pub fn login(&self, username: &str, password: &str) -> AppResult<Principal> {
        let req = LoginRequest { username: username.to_string(), password: password.to_string() };
        Ok(self.auth.authenticate(&req)?)
    }
}

#[derive(Clone)]
pub enum Backend {
    Local(LocalBackend),
    Remote(HttpSession),
}

/// What a single input line amounted to.
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    Empty,
    Exit,
    Help,
    WhoAmI,
    Done { operation: Operation, output: JsonValue },
    Failed(AppError),
}

impl LineOutcome {
    /// Process exit code when this was the only command.
    pub fn exit_code(&self) -> i32 {
        match self {
            LineOutcome::Failed(e) => e.cli_exit_code(),
            _ => 0,
        }
    }

    pub fn lines(&self, principal: &Principal) -> Vec<String> {
        match self {
            LineOutcome::Empty | LineOutcome::Exit => Vec::new(),
            LineOutcome::Help => super::usage().lines().map(str::to_string).collect(),
            LineOutcome::WhoAmI => vec![format!("{} (role: {})", principal.identity, principal.role)],
            LineOutcome::Done { operation, output } => render::render_result(*operation, output),
            LineOutcome::Failed(e) => vec![render::render_error(e)],
        }
    }
}

pub struct ClientSession {
    backend: Backend,
    principal: Principal,
}

impl ClientSession {
    pub fn local(backend: LocalBackend, username: &str, password: &str) -> AppResult<Self> {
        let principal = backend.login(username, password)?;
        info!(target: "kvguard::cli", user = %principal.identity, role = %principal.role, "local session opened");
        Ok(Self { backend: Backend::Local(backend), principal })
    }

    pub async fn remote(url: &str, username: &str, password: &str) -> anyhow::Result<Self> {
        let http = HttpSession::connect(url, username, password).await?;
        let principal = http.principal().clone();
        info!(target: "kvguard::cli", user = %principal.identity, role = %principal.role, server = %http.base(), "remote session opened");
        Ok(Self { backend: Backend::Remote(http), principal })
    }

    pub fn principal(&self) -> &Principal { &self.principal }

    pub fn prompt(&self) -> String { format!("{}@{} $ ", self.principal.identity, self.principal.role) }

    pub async fn execute(&self, op: Operation, req: &StoreRequest) -> AppResult<JsonValue> {
        match &self.backend {
            Backend::Local(local) => exec::execute(&local.authorizer, &local.store, &self.principal, op, req),
            Backend::Remote(http) => http.post_operation(op, req).await,
        }
    }

    pub async fn handle_line(&self, line: &str) -> LineOutcome {
        let trimmed = line.trim();
        if trimmed.is_empty() { return LineOutcome::Empty; }
        match trimmed.to_ascii_lowercase().as_str() {
            "exit" | "quit" => return LineOutcome::Exit,
            "help" => return LineOutcome::Help,
            "whoami" => return LineOutcome::WhoAmI,
            _ => {}
        }
        let cmd = match parse_command(trimmed) {
            Ok(c) => c,
            Err(e) => {
                debug!(target: "kvguard::usage", user = %self.principal.identity, error = %e, "command rejected");
                return LineOutcome::Failed(e.into());
            }
        };
        match self.execute(cmd.operation, &cmd.request).await {
            Ok(output) => LineOutcome::Done { operation: cmd.operation, output },
            Err(e) => LineOutcome::Failed(e),
        }
    }

    pub async fn close(self) {
        if let Backend::Remote(http) = &self.backend {
            if let Err(e) = http.logout().await {
                debug!(target: "kvguard::cli", error = %e, "logout failed");
            }
        }
    }
}
