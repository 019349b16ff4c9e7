use serde::{Deserialize, Serialize};

/// An authenticated actor. Bound to exactly one role for the life of its session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Principal {
    pub identity: String,
    pub role: String,
}

impl Principal {
    pub fn new(identity: impl Into<String>, role: impl Into<String>) -> Self {
        Self { identity: identity.into(), role: role.into() }
    }
}
