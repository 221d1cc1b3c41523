//! Public auth operations.
//!
//! `AuthClient` forwards sign-up, sign-in, sign-out and password reset to
//! the provider and turns rejections into `OperationError`. It never
//! writes to the session store: the provider's change event that follows
//! a successful call is what updates consumers.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::OperationError;
use crate::provider::{IdentityProvider, ProviderError};

/// Clone is cheap - the provider is shared.
#[derive(Clone)]
pub struct AuthClient {
    provider: Arc<dyn IdentityProvider>,
}

impl AuthClient {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    /// Register a new account.
    ///
    /// Success does not mean signed in: depending on the provider either a
    /// `SignedIn` event follows or the user has to confirm their email.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<(), OperationError> {
        require_credentials(email, password)?;
        debug!(email, "Sign-up requested");
        let result = self.provider.sign_up(email, password).await;
        normalize("sign_up", result)
    }

    /// Sign in with email and password.
    ///
    /// The new session is not returned here and may not be in the store yet
    /// when this resolves; wait for the store to change instead.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), OperationError> {
        require_credentials(email, password)?;
        debug!(email, "Sign-in requested");
        let result = self.provider.sign_in_with_password(email, password).await;
        normalize("sign_in", result)
    }

    pub async fn sign_out(&self) -> Result<(), OperationError> {
        debug!("Sign-out requested");
        let result = self.provider.sign_out().await;
        normalize("sign_out", result)
    }

    /// Ask the provider to send a password reset email. No store effect.
    pub async fn reset_password(&self, email: &str) -> Result<(), OperationError> {
        if email.trim().is_empty() {
            return Err(OperationError::new("Email required"));
        }
        debug!(email, "Password reset requested");
        let result = self.provider.request_password_reset(email).await;
        normalize("reset_password", result)
    }
}

fn require_credentials(email: &str, password: &str) -> Result<(), OperationError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(OperationError::new("Email and password required"));
    }
    Ok(())
}

fn normalize(operation: &'static str, result: Result<(), ProviderError>) -> Result<(), OperationError> {
    result.map_err(|e| {
        warn!(operation, error = %e, "Auth operation rejected");
        OperationError::from(e)
    })
}
