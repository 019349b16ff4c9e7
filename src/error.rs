//! Unified application error model and mapping helpers.
//! Shared by the HTTP front-end and the CLI so a denial, a caller mistake, or an
//! authorization fault renders the same way on both surfaces.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::authz::{ClassifyError, Verdict};
use crate::identity::AuthError;
use crate::storage::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Auth { code: String, message: String },
    Forbidden { code: String, message: String },
    Unavailable { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::Unavailable { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::Unavailable { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn unavailable<S: Into<String>>(code: S, msg: S) -> Self { AppError::Unavailable { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map a denied verdict. A plain denial is 403; a fault keeps the generic
    /// reason but becomes 503 (retryable) or 500.
    pub fn from_denial(verdict: &Verdict) -> Option<Self> {
        let reason = verdict.reason()?.to_string();
        Some(match verdict.fault() {
            None => AppError::Forbidden { code: "access_denied".into(), message: reason },
            Some(f) if f.is_retryable() => AppError::Unavailable { code: "authorization_unavailable".into(), message: reason },
            Some(_) => AppError::Internal { code: "authorization_fault".into(), message: reason },
        })
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::Conflict { .. } => 409,
            AppError::Auth { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::Unavailable { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }

    /// Process exit code for one-shot CLI commands: 3 denied, 2 usage, 1 anything else.
    pub fn cli_exit_code(&self) -> i32 {
        match self {
            AppError::Forbidden { .. } => 3,
            AppError::UserInput { .. } => 2,
            _ => 1,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal".into(), message: err.to_string() }
    }
}

impl From<ClassifyError> for AppError {
    fn from(err: ClassifyError) -> Self {
        let code = match err {
            ClassifyError::UnknownOperation(_) => "unknown_operation",
            ClassifyError::MissingTarget(_) => "missing_target",
        };
        AppError::UserInput { code: code.into(), message: err.to_string() }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let message = err.to_string();
        match err {
            StoreError::NoSuchTable(_) => AppError::NotFound { code: "no_such_table".into(), message },
            StoreError::NoSuchItem(_) => AppError::NotFound { code: "no_such_item".into(), message },
            StoreError::TableExists(_) => AppError::Conflict { code: "table_exists".into(), message },
            StoreError::MissingKey { .. } => AppError::UserInput { code: "missing_key".into(), message },
            StoreError::InvalidArgument(_) => AppError::UserInput { code: "invalid_argument".into(), message },
            StoreError::Busy(_) => AppError::Unavailable { code: "store_busy".into(), message },
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        match err {
            AuthError::AuthenticationFailed => AppError::Auth { code: "authentication_failed".into(), message },
            AuthError::Unavailable(_) => AppError::Unavailable { code: "auth_unavailable".into(), message },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
