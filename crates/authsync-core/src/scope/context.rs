//! Consumer access point.
//!
//! Readers reach the session state and the auth operations through an
//! `AuthContext`. There are two ways to get one: from an `AuthHandle`
//! passed down explicitly, or with `use_auth()` inside a future run by
//! `SessionScope::provide`. Either fails with `AuthError::Configuration`
//! when no live scope backs the call.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::error;

use crate::auth::{AuthState, Session, User};
use crate::error::{AuthError, OperationError};
use crate::facade::AuthClient;
use crate::store::SessionStore;

tokio::task_local! {
    pub(crate) static CURRENT_AUTH: AuthHandle;
}

/// Cloneable reference to one scope's store and auth client.
#[derive(Clone)]
pub struct AuthHandle {
    store: Arc<SessionStore>,
    client: AuthClient,
}

impl AuthHandle {
    pub(crate) fn new(store: Arc<SessionStore>, client: AuthClient) -> Self {
        Self { store, client }
    }

    pub fn is_active(&self) -> bool {
        self.store.is_live()
    }

    pub fn context(&self) -> Result<AuthContext, AuthError> {
        if !self.is_active() {
            error!("Auth context requested from a torn down scope");
            return Err(AuthError::Configuration);
        }
        Ok(AuthContext {
            state: self.store.subscribe(),
            client: self.client.clone(),
        })
    }
}

/// Look up the auth context installed by the enclosing
/// [`SessionScope::provide`](crate::SessionScope::provide).
pub fn use_auth() -> Result<AuthContext, AuthError> {
    match CURRENT_AUTH.try_with(AuthHandle::context) {
        Ok(context) => context,
        Err(_) => {
            error!("use_auth called outside an AuthProvider scope");
            Err(AuthError::Configuration)
        }
    }
}

/// Current auth state plus the four auth operations.
#[derive(Clone)]
pub struct AuthContext {
    state: watch::Receiver<AuthState>,
    client: AuthClient,
}

impl AuthContext {
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.state.borrow().user().cloned()
    }

    pub fn session(&self) -> Option<Session> {
        self.state.borrow().session().cloned()
    }

    pub fn loading(&self) -> bool {
        self.state.borrow().loading()
    }

    /// Receiver that wakes on every store update.
    pub fn changes(&self) -> watch::Receiver<AuthState> {
        self.state.clone()
    }

    pub fn client(&self) -> &AuthClient {
        &self.client
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<(), OperationError> {
        self.client.sign_up(email, password).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), OperationError> {
        self.client.sign_in(email, password).await
    }

    pub async fn sign_out(&self) -> Result<(), OperationError> {
        self.client.sign_out().await
    }

    pub async fn reset_password(&self, email: &str) -> Result<(), OperationError> {
        self.client.reset_password(email).await
    }
}
