use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use parking_lot::RwLock;
use crate::tprintln;

use super::principal::Principal;

pub type SessionToken = String;

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub token: SessionToken,
    pub principal: Principal,
    pub expires_at: Instant,
}

impl Session {
    pub fn expires_in(&self) -> Duration { self.expires_at.saturating_duration_since(Instant::now()) }
}

#[derive(Debug, Default)]
struct Sessions {
    by_token: HashMap<SessionToken, Session>,
    by_user: HashMap<String, HashSet<SessionToken>>,
}

fn gen_id() -> Result<String, getrandom::Error> {
    // 256-bit random token base64url without padding
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf)?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

impl Sessions {
    fn prune_expired(&mut self, now: Instant) -> usize {
        let before = self.by_token.len();
        self.by_token.retain(|_, sess| sess.expires_at > now);
        let by_token = &self.by_token;
        self.by_user.retain(|_, tokens| {
            tokens.retain(|t| by_token.contains_key(t));
            !tokens.is_empty()
        });
        before - self.by_token.len()
    }

    fn remove(&mut self, token: &str) -> Option<Session> {
        let sess = self.by_token.remove(token)?;
        if let Some(set) = self.by_user.get_mut(&sess.principal.identity) {
            set.remove(token);
            if set.is_empty() { self.by_user.remove(&sess.principal.identity); }
        }
        Some(sess)
    }
}

/// Bearer-token sessions. Clones share the same session table.
#[derive(Debug, Clone)]
pub struct SessionManager {
    pub ttl: Duration,
    inner: Arc<RwLock<Sessions>>,
}

impl Default for SessionManager {
    fn default() -> Self { Self::new(Duration::from_secs(60 * 60)) }
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self { Self { ttl, inner: Arc::new(RwLock::new(Sessions::default())) } }

    /// Open a session for `principal`. Expired sessions are swept on every issue.
    pub fn issue(&self, principal: Principal) -> Result<Session, getrandom::Error> {
        let now = Instant::now();
        let sess = Session {
            session_id: gen_id()?,
            token: gen_id()?,
            principal,
            expires_at: now + self.ttl,
        };
        let (pruned, active) = {
            let mut s = self.inner.write();
            let pruned = s.prune_expired(now);
            s.by_user.entry(sess.principal.identity.clone()).or_default().insert(sess.token.clone());
            s.by_token.insert(sess.token.clone(), sess.clone());
            (pruned, s.by_token.len())
        };
        tprintln!("session.issue user={} sid={} ttl_secs={} pruned={} active={}", sess.principal.identity, sess.session_id, self.ttl.as_secs(), pruned, active);
        Ok(sess)
    }

    /// Principal for a live token. Expired tokens are dropped on sight.
    pub fn validate(&self, token: &str) -> Option<Principal> {
        let now = Instant::now();
        {
            let s = self.inner.read();
            match s.by_token.get(token) {
                None => return None,
                Some(sess) if sess.expires_at > now => return Some(sess.principal.clone()),
                Some(_) => {}
            }
        }
        self.logout(token);
        None
    }

    pub fn logout(&self, token: &str) -> bool { self.inner.write().remove(token).is_some() }

    /// Drop every session of `identity`, e.g. after its `users` row changed.
    pub fn revoke_user(&self, identity: &str) -> usize {
        let mut s = self.inner.write();
        let tokens = s.by_user.remove(identity).unwrap_or_default();
        let count = tokens.iter().filter(|t| s.by_token.remove(*t).is_some()).count();
        tprintln!("session.revoke user={} count={}", identity, count);
        count
    }
}
