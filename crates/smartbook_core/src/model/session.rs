//! Authenticated session model.

use serde::{Deserialize, Serialize};

/// Session issued by the remote gateway after sign-in.
///
/// Its presence gates every bookmark operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub is_authenticated: bool,
}

impl Session {
    pub fn authenticated(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            is_authenticated: true,
        }
    }

    /// Returns whether this session may drive bookmark operations.
    pub fn is_active(&self) -> bool {
        self.is_authenticated && !self.user_id.trim().is_empty()
    }
}

/// Auth state transitions delivered by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    SignedIn(Session),
    /// Same user, fresh credentials; the reconciled list stays valid.
    TokenRefreshed(Session),
    SignedOut,
}
