use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The authenticated principal carried by a [`Session`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub email_confirmed_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_confirmed(&self) -> bool {
        self.email_confirmed_at.is_some()
    }
}

/// Opaque token bundle issued by the identity provider.
///
/// The session owns its user, so a store holding a session always has a
/// user to show and a store without one never does.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Time left before expiry, clamped at zero.
    pub fn expires_in(&self) -> Duration {
        (self.expires_at - Utc::now()).max(Duration::zero())
    }
}

// Token material stays out of logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Snapshot of who is signed in, as seen by consumers.
///
/// Fields are private: only the session store builds these, and it only
/// has two ways to do so.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthState {
    user: Option<User>,
    session: Option<Session>,
    loading: bool,
}

impl AuthState {
    /// State of a scope whose bootstrap fetch has not resolved yet.
    pub(crate) fn bootstrapping() -> Self {
        Self {
            user: None,
            session: None,
            loading: true,
        }
    }

    /// State once bootstrap has settled, derived entirely from `session`.
    pub(crate) fn settled(session: Option<Session>) -> Self {
        Self {
            user: session.as_ref().map(|s| s.user.clone()),
            session,
            loading: false,
        }
    }

    /// Clears `loading` without touching user or session. Returns whether
    /// anything changed.
    pub(crate) fn finish_loading(&mut self) -> bool {
        std::mem::replace(&mut self.loading, false)
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }
}

#[cfg(test)]
pub(crate) fn test_session(email: &str) -> Session {
    let now = Utc::now();
    Session {
        access_token: format!("access-{email}"),
        refresh_token: format!("refresh-{email}"),
        expires_at: now + Duration::hours(1),
        user: User {
            id: format!("user-{email}"),
            email: email.to_string(),
            created_at: now,
            email_confirmed_at: Some(now),
        },
    }
}
