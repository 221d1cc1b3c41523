use serde::{Deserialize, Serialize};

use super::Session;

/// Why the provider pushed a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthChangeKind {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

impl AuthChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthChangeKind::InitialSession => "INITIAL_SESSION",
            AuthChangeKind::SignedIn => "SIGNED_IN",
            AuthChangeKind::SignedOut => "SIGNED_OUT",
            AuthChangeKind::TokenRefreshed => "TOKEN_REFRESHED",
            AuthChangeKind::UserUpdated => "USER_UPDATED",
            AuthChangeKind::PasswordRecovery => "PASSWORD_RECOVERY",
        }
    }
}

/// A push notification from the identity provider.
///
/// `session` is the complete new session (or its absence); the store
/// replaces what it holds with it rather than merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChangeEvent {
    pub kind: AuthChangeKind,
    pub session: Option<Session>,
}

impl AuthChangeEvent {
    pub fn new(kind: AuthChangeKind, session: Option<Session>) -> Self {
        Self { kind, session }
    }

    pub fn signed_in(session: Session) -> Self {
        Self::new(AuthChangeKind::SignedIn, Some(session))
    }

    pub fn signed_out() -> Self {
        Self::new(AuthChangeKind::SignedOut, None)
    }
}
