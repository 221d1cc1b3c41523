//! authsync-core - keeps "who is signed in" consistent with an identity
//! provider's event stream.
//!
//! A [`SessionScope`] owns the provider subscription and a single
//! [`SessionStore`] writer. The bootstrap fetch and pushed change events
//! are applied on one driver task, with change events taking precedence
//! over a bootstrap answer that arrives after them. [`AuthClient`] wraps
//! the provider's mutations without touching the store, and
//! [`use_auth`] / [`AuthHandle::context`] give consumers a read view plus
//! the operations.

pub mod auth;
pub mod config;
pub mod error;
pub mod facade;
pub mod provider;
pub mod scope;
pub mod store;

pub use auth::{AuthChangeEvent, AuthChangeKind, AuthState, Session, User};
pub use config::AuthConfig;
pub use error::{AuthError, OperationError, OUTSIDE_SCOPE_MESSAGE};
pub use facade::AuthClient;
pub use provider::{
    BootstrapGate, IdentityProvider, InMemoryProvider, Operation, ProviderError, Subscription,
};
pub use scope::{use_auth, AuthContext, AuthHandle, SessionScope, SyncPhase};
pub use store::SessionStore;
