use thiserror::Error;
use tracing::{info, warn};

use super::principal::Principal;
use super::session::{Session, SessionManager};
use crate::security;
use crate::storage::SharedStore;

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub session: Session,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Unknown user, wrong password, or a user without a role. Never says which.
    #[error("authentication failed: invalid username or password")]
    AuthenticationFailed,
    #[error("authentication service unavailable: {0}")]
    Unavailable(String),
}

/// Upstream producer of authenticated principals. The gate never calls this.
pub trait AuthProvider: Send + Sync {
    fn authenticate(&self, req: &LoginRequest) -> Result<Principal, AuthError>;
}

/// Verifies Argon2 hashes stored in the `users` table.
#[derive(Clone)]
pub struct StoreAuthProvider {
    store: SharedStore,
}

impl StoreAuthProvider {
    pub fn new(store: SharedStore) -> Self { Self { store } }
}

impl AuthProvider for StoreAuthProvider {
    fn authenticate(&self, req: &LoginRequest) -> Result<Principal, AuthError> {
        let user = security::find_user(&self.store, &req.username).map_err(|e| AuthError::Unavailable(e.to_string()))?;
        let Some(user) = user else { return Err(AuthError::AuthenticationFailed); };
        if !security::verify_password(&user.password_hash, &req.password) {
            return Err(AuthError::AuthenticationFailed);
        }
        Ok(Principal::new(user.username, user.role_name))
    }
}

fn token_unavailable(e: getrandom::Error) -> AuthError {
    AuthError::Unavailable(format!("cannot generate session token: {}", e))
}

/// Authenticate and open a session.
pub fn login(provider: &dyn AuthProvider, sm: &SessionManager, req: &LoginRequest) -> Result<LoginResponse, AuthError> {
    match provider.authenticate(req) {
        Ok(principal) => {
            let session = sm.issue(principal).map_err(|e| {
                warn!(target: "kvguard::auth", user = %req.username, error = %e, "session token generation failed");
                token_unavailable(e)
            })?;
            info!(target: "kvguard::auth", user = %session.principal.identity, role = %session.principal.role, "login");
            Ok(LoginResponse { session })
        }
        Err(e) => {
            warn!(target: "kvguard::auth", user = %req.username, error = %e, "login rejected");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> StoreAuthProvider {
        let store = SharedStore::new();
        security::ensure_security_tables(&store, "pw").unwrap();
        security::put_user(&store, "rita", "123", "reader").unwrap();
        StoreAuthProvider::new(store)
    }

    fn req(u: &str, p: &str) -> LoginRequest { LoginRequest { username: u.into(), password: p.into() } }

    #[test]
    fn valid_credentials_yield_principal() {
        let p = provider().authenticate(&req("rita", "123")).unwrap();
        assert_eq!(p, Principal::new("rita", "reader"));
    }

    #[test]
    fn bad_password_and_unknown_user_look_the_same() {
        let prov = provider();
        assert_eq!(prov.authenticate(&req("rita", "nope")), Err(AuthError::AuthenticationFailed));
        assert_eq!(prov.authenticate(&req("nonexistentuser", "123")), Err(AuthError::AuthenticationFailed));
    }

    #[test]
    fn login_issues_a_session() {
        let sm = SessionManager::default();
        let resp = login(&provider(), &sm, &req("admin", "pw")).unwrap();
        assert_eq!(sm.validate(&resp.session.token).map(|p| p.role), Some("admin".to_string()));
    }

    #[test]
    fn missing_users_table_is_unavailable() {
        let prov = StoreAuthProvider::new(SharedStore::new());
        assert!(matches!(prov.authenticate(&req("a", "b")), Err(AuthError::Unavailable(_))));
    }

    #[test]
    fn rng_failure_is_unavailable_not_a_token() {
        let err = token_unavailable(getrandom::Error::UNSUPPORTED);
        assert!(matches!(err, AuthError::Unavailable(ref m) if m.starts_with("cannot generate session token")));
        assert_eq!(crate::error::AppError::from(err).http_status(), 503);
    }
}
