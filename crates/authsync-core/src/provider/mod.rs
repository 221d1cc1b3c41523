//! Identity provider capability.
//!
//! The core never speaks a wire protocol itself. Everything it needs from
//! the outside world is behind `IdentityProvider`:
//! - a one-shot read of the current session (the bootstrap fetch)
//! - a push stream of change events (`Subscription`)
//! - the four mutations behind the auth facade
//!
//! `InMemoryProvider` implements it in-process for tests and the CLI.

pub mod error;
pub mod memory;
pub mod subscription;

use async_trait::async_trait;

use crate::auth::Session;

pub use error::ProviderError;
pub use memory::{BootstrapGate, InMemoryProvider, Operation};
pub use subscription::Subscription;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Session the provider currently considers active, if any.
    async fn get_current_session(&self) -> Result<Option<Session>, ProviderError>;

    /// Registers a listener. Events may start flowing before this returns.
    fn subscribe(&self) -> Subscription;

    async fn sign_up(&self, email: &str, password: &str) -> Result<(), ProviderError>;

    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> Result<(), ProviderError>;

    async fn sign_out(&self) -> Result<(), ProviderError>;

    async fn request_password_reset(&self, email: &str) -> Result<(), ProviderError>;
}
