//! Principal/session boundary: authenticates credentials and yields the principal the
//! gate decides for. Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod session;
mod provider;
mod request_context;

pub use principal::Principal;
pub use session::{Session, SessionToken, SessionManager};
pub use provider::{login, AuthError, AuthProvider, LoginRequest, LoginResponse, StoreAuthProvider};
pub use request_context::RequestContext;
