use anyhow::{anyhow, Context, Result};
use reqwest::Url;
use serde_json::Value as JsonValue;

use crate::authz::Operation;
use crate::error::{AppError, AppResult};
use crate::identity::Principal;
use crate::storage::ops::StoreRequest;

/// Logged-in connection to a kvguard HTTP server.
#[derive(Clone)]
pub struct HttpSession {
    base: Url,
    client: reqwest::Client,
    token: String,
    principal: Principal,
}

impl HttpSession {
    pub async fn connect(base: &str, user: &str, pass: &str) -> Result<Self> {
        let base_url = Url::parse(base).context("invalid base URL")?;
        let client = reqwest::Client::builder().build()?;
        // POST /login
        let login_url = base_url.join("/login")?;
        let resp = client
            .post(login_url)
            .json(&serde_json::json!({"username": user, "password": pass}))
            .send()
            .await
            .with_context(|| format!("connecting to {}", base_url))?;
        if !resp.status().is_success() {
            return Err(anyhow!("login failed: HTTP {}", resp.status()));
        }
        let v: JsonValue = resp.json().await.unwrap_or(JsonValue::Null);
        let token = v.get("access_token").and_then(|s| s.as_str()).unwrap_or("").to_string();
        if token.is_empty() { return Err(anyhow!("login response carried no access token")); }

        // GET /users/me for the prompt
        let me_url = base_url.join("/users/me")?;
        let resp = client.get(me_url).bearer_auth(&token).send().await?;
        if !resp.status().is_success() { return Err(anyhow!("failed to read session principal: HTTP {}", resp.status())); }
        let me: JsonValue = resp.json().await.unwrap_or(JsonValue::Null);
        let principal = Principal::new(
            me.get("username").and_then(|s| s.as_str()).unwrap_or(user),
            me.get("role").and_then(|s| s.as_str()).unwrap_or("unknown"),
        );
        Ok(Self { base: base_url, client, token, principal })
    }

    pub fn principal(&self) -> &Principal { &self.principal }

    pub fn base(&self) -> &Url { &self.base }

    /// Run one operation remotely. Server errors come back as the same [`AppError`].
    pub async fn post_operation(&self, op: Operation, req: &StoreRequest) -> AppResult<JsonValue> {
        let url = self
            .base
            .join(&format!("/api/ops/{}", op.as_str()))
            .map_err(|e| AppError::internal("bad_url".to_string(), e.to_string()))?;
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(req)
            .send()
            .await
            .map_err(|e| AppError::unavailable("connection_failed".to_string(), e.to_string()))?;
        let status = resp.status();
        let val: JsonValue = resp.json().await.unwrap_or(JsonValue::Null);
        if status.is_success() { return Ok(val); }
        Err(serde_json::from_value::<AppError>(val.clone())
            .unwrap_or_else(|_| AppError::internal("remote_error".to_string(), format!("HTTP {}: {}", status, val))))
    }

    pub async fn logout(&self) -> Result<()> {
        let url = self.base.join("/logout")?;
        let resp = self.client.post(url).bearer_auth(&self.token).send().await?;
        if !resp.status().is_success() { return Err(anyhow!("logout failed: HTTP {}", resp.status())); }
        Ok(())
    }
}
