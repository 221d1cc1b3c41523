//! The single authoritative record of who is signed in.
//!
//! One writer (the synchronizer driver) and any number of readers, which
//! hold `watch::Receiver`s and see every published snapshot. Writers go
//! through two doors only: the bootstrap result and provider change
//! events. Nothing here can put `loading` back to `true`.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tracing::{debug, trace};

use crate::auth::{AuthChangeEvent, AuthState, Session};

pub struct SessionStore {
    state: watch::Sender<AuthState>,
    live: AtomicBool,
    // Set by the first change event; a bootstrap result arriving later is stale.
    bootstrap_superseded: AtomicBool,
}

impl SessionStore {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(AuthState::bootstrapping());
        Self {
            state,
            live: AtomicBool::new(true),
            bootstrap_superseded: AtomicBool::new(false),
        }
    }

    // =========================================================================
    // Readers
    // =========================================================================

    pub fn snapshot(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    // =========================================================================
    // Writer (synchronizer only)
    // =========================================================================

    /// Apply the bootstrap fetch result. Returns whether the store changed.
    pub(crate) fn complete_bootstrap(&self, session: Option<Session>) -> bool {
        if !self.is_live() {
            debug!("Bootstrap resolved after teardown, ignoring");
            return false;
        }

        if self.bootstrap_superseded.load(Ordering::Acquire) {
            debug!("Bootstrap result superseded by a change event");
            return self.state.send_if_modified(|state| state.finish_loading());
        }

        debug!(authenticated = session.is_some(), "Bootstrap applied");
        self.state.send_replace(AuthState::settled(session));
        true
    }

    /// Replace user and session with what the event carries.
    pub(crate) fn apply_change(&self, event: &AuthChangeEvent) -> bool {
        if !self.is_live() {
            trace!(kind = event.kind.as_str(), "Change event after teardown, ignoring");
            return false;
        }

        self.bootstrap_superseded.store(true, Ordering::Release);
        debug!(
            kind = event.kind.as_str(),
            authenticated = event.session.is_some(),
            "Change event applied"
        );
        self.state
            .send_replace(AuthState::settled(event.session.clone()));
        true
    }

    /// Stop accepting writes. Returns `false` if already closed.
    pub(crate) fn close(&self) -> bool {
        self.live.swap(false, Ordering::AcqRel)
    }
}
