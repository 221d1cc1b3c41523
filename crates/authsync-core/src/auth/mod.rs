//! Session data model shared by every layer of the crate.
//!
//! This module provides:
//! - `Session` / `User`: what the identity provider hands out
//! - `AuthState`: the `{ user, session, loading }` snapshot consumers read
//! - `AuthChangeEvent`: the provider's push notifications

pub mod event;
pub mod session;

pub use event::{AuthChangeEvent, AuthChangeKind};
pub use session::{AuthState, Session, User};

#[cfg(test)]
pub(crate) use session::test_session;
