//! Driver task behind a `SessionScope`.
//!
//! Runs the bootstrap fetch and drains the provider's change stream on one
//! task, so the order writes reach the store is the order they were
//! delivered here. A change event that lands first marks the bootstrap as
//! superseded inside the store.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::auth::Session;
use crate::provider::{IdentityProvider, Subscription};
use crate::store::SessionStore;

/// Lifecycle of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Uninitialized,
    Bootstrapping,
    Live,
    TornDown,
}

impl SyncPhase {
    /// Whether the bootstrap window is over.
    pub fn is_settled(&self) -> bool {
        matches!(self, SyncPhase::Live | SyncPhase::TornDown)
    }
}

/// Closes the store and reports `TornDown` on every exit path of the
/// driver, unwinding included.
struct Teardown {
    store: Arc<SessionStore>,
    phase: watch::Sender<SyncPhase>,
}

impl Drop for Teardown {
    fn drop(&mut self) {
        self.store.close();
        self.phase.send_replace(SyncPhase::TornDown);
        info!("Session scope torn down");
    }
}

pub(crate) struct Driver {
    pub provider: Arc<dyn IdentityProvider>,
    pub store: Arc<SessionStore>,
    pub subscription: Subscription,
    pub phase: watch::Sender<SyncPhase>,
    pub shutdown: oneshot::Receiver<()>,
    pub bootstrap_timeout: Duration,
}

impl Driver {
    pub(crate) async fn run(self) {
        let Driver {
            provider,
            store,
            mut subscription,
            phase,
            mut shutdown,
            bootstrap_timeout,
        } = self;

        let teardown = Teardown {
            store: store.clone(),
            phase,
        };

        let bootstrap = bootstrap(provider, bootstrap_timeout);
        tokio::pin!(bootstrap);
        let mut bootstrapping = true;
        let mut stream_open = true;

        loop {
            tokio::select! {
                // Shutdown first, then delivered events, then the bootstrap
                // answer: when both are ready the event is the live one.
                biased;

                _ = &mut shutdown => {
                    debug!("Shutdown signalled");
                    break;
                }

                event = subscription.recv(), if stream_open => match event {
                    Some(event) => {
                        store.apply_change(&event);
                    }
                    None => {
                        warn!("Provider closed the change stream");
                        stream_open = false;
                    }
                },

                session = &mut bootstrap, if bootstrapping => {
                    bootstrapping = false;
                    store.complete_bootstrap(session);
                    teardown.phase.send_replace(SyncPhase::Live);
                    info!(
                        authenticated = store.snapshot().is_authenticated(),
                        "Session scope live"
                    );
                }
            }
        }

        subscription.unsubscribe();
        drop(teardown);
    }
}

/// Fetch the current session. Every failure mode, including a panicking
/// provider, comes back as `None`.
async fn bootstrap(provider: Arc<dyn IdentityProvider>, timeout: Duration) -> Option<Session> {
    let fetch = AssertUnwindSafe(provider.get_current_session()).catch_unwind();

    match tokio::time::timeout(timeout, fetch).await {
        Ok(Ok(Ok(Some(session)))) if session.is_expired() => {
            debug!("Bootstrap returned an expired session, treating as signed out");
            None
        }
        Ok(Ok(Ok(session))) => session,
        Ok(Ok(Err(e))) => {
            warn!(error = %e, "Bootstrap fetch failed, treating as signed out");
            None
        }
        Ok(Err(_)) => {
            error!("Bootstrap fetch panicked, treating as signed out");
            None
        }
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "Bootstrap fetch timed out");
            None
        }
    }
}
