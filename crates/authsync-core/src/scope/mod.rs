//! Session scope: the lifetime during which a synchronizer runs and holds
//! the provider subscription.
//!
//! `SessionScope::start` subscribes before returning and spawns the driver
//! task. Dropping the scope or calling `shutdown` tears it down; the
//! subscription is released exactly once either way.

pub mod context;
pub mod synchronizer;

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::AuthConfig;
use crate::facade::AuthClient;
use crate::provider::IdentityProvider;
use crate::store::SessionStore;

pub use context::{use_auth, AuthContext, AuthHandle};
pub use synchronizer::SyncPhase;

use context::CURRENT_AUTH;
use synchronizer::Driver;

pub struct SessionScope {
    handle: AuthHandle,
    phase: watch::Receiver<SyncPhase>,
    shutdown: Option<oneshot::Sender<()>>,
    driver: Option<JoinHandle<()>>,
}

impl SessionScope {
    /// Open a scope against `provider`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(provider: Arc<dyn IdentityProvider>, config: AuthConfig) -> Self {
        let store = Arc::new(SessionStore::new());
        let (phase_tx, phase_rx) = watch::channel(SyncPhase::Uninitialized);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        // Subscribe before the bootstrap fetch is issued so nothing pushed
        // in between is lost.
        let subscription = provider.subscribe();
        phase_tx.send_replace(SyncPhase::Bootstrapping);
        info!("Session scope bootstrapping");

        let driver = Driver {
            provider: provider.clone(),
            store: store.clone(),
            subscription,
            phase: phase_tx,
            shutdown: shutdown_rx,
            bootstrap_timeout: config.bootstrap_timeout,
        };
        let driver = tokio::spawn(driver.run());

        Self {
            handle: AuthHandle::new(store, AuthClient::new(provider)),
            phase: phase_rx,
            shutdown: Some(shutdown_tx),
            driver: Some(driver),
        }
    }

    pub fn handle(&self) -> AuthHandle {
        self.handle.clone()
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }

    /// Resolves once bootstrap has settled (or the scope is already gone).
    pub async fn wait_until_live(&self) -> SyncPhase {
        let mut phase = self.phase.clone();
        let settled = match phase.wait_for(SyncPhase::is_settled).await {
            Ok(current) => *current,
            Err(_) => SyncPhase::TornDown,
        };
        settled
    }

    /// Run `fut` with this scope visible to [`use_auth`].
    pub async fn provide<F: Future>(&self, fut: F) -> F::Output {
        CURRENT_AUTH.scope(self.handle.clone(), fut).await
    }

    /// Tear down and wait for the driver to release the subscription.
    pub async fn shutdown(mut self) {
        self.signal_shutdown();
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.await {
                error!(error = %e, "Session driver task failed");
            }
        }
    }

    fn signal_shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for SessionScope {
    fn drop(&mut self) {
        self.signal_shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::auth::{test_session, AuthChangeEvent, Session};
    use crate::error::AuthError;
    use crate::provider::{InMemoryProvider, ProviderError, Subscription};

    fn start(provider: &InMemoryProvider) -> SessionScope {
        SessionScope::start(Arc::new(provider.clone()), AuthConfig::default())
    }

    /// Provider whose bootstrap fetch panics; counts subscription releases.
    #[derive(Default)]
    struct PanickingProvider {
        releases: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl IdentityProvider for PanickingProvider {
        async fn get_current_session(&self) -> Result<Option<Session>, ProviderError> {
            panic!("backend exploded");
        }

        fn subscribe(&self) -> Subscription {
            let (_tx, rx) = mpsc::unbounded_channel();
            let releases = self.releases.clone();
            Subscription::new(rx, move || {
                releases.fetch_add(1, Ordering::SeqCst);
            })
        }

        async fn sign_up(&self, _: &str, _: &str) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn sign_in_with_password(&self, _: &str, _: &str) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn sign_out(&self) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn request_password_reset(&self, _: &str) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_start_subscribes_before_returning() {
        let provider = InMemoryProvider::new();
        let _gate = provider.hold_bootstrap();
        let scope = start(&provider);

        assert_eq!(provider.subscriber_count(), 1);
        assert_eq!(scope.phase(), SyncPhase::Bootstrapping);
        assert!(scope.handle().context().unwrap().loading());
    }

    #[tokio::test]
    async fn test_bootstrap_with_existing_session() {
        let provider = InMemoryProvider::new();
        let session = test_session("ada@example.com");
        provider.emit(AuthChangeEvent::signed_in(session.clone()));

        let scope = start(&provider);
        assert_eq!(scope.wait_until_live().await, SyncPhase::Live);

        let state = scope.handle().context().unwrap().state();
        assert!(!state.loading());
        assert_eq!(state.session(), Some(&session));
    }

    #[tokio::test]
    async fn test_expired_bootstrap_session_counts_as_signed_out() {
        let provider = InMemoryProvider::new();
        let mut session = test_session("ada@example.com");
        session.expires_at = chrono::Utc::now() - chrono::Duration::minutes(5);
        provider.emit(AuthChangeEvent::signed_in(session));

        let scope = start(&provider);
        scope.wait_until_live().await;
        assert!(!scope.handle().context().unwrap().state().is_authenticated());
    }

    #[tokio::test]
    async fn test_failed_bootstrap_settles_unauthenticated() {
        let provider = InMemoryProvider::new();
        provider.fail_bootstrap("connection refused");

        let scope = start(&provider);
        assert_eq!(scope.wait_until_live().await, SyncPhase::Live);
        let state = scope.handle().context().unwrap().state();
        assert!(!state.loading());
        assert!(!state.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_timeout_settles_unauthenticated() {
        let provider = InMemoryProvider::new();
        let _gate = provider.hold_bootstrap();
        let scope = SessionScope::start(
            Arc::new(provider.clone()),
            AuthConfig::default().with_bootstrap_timeout(Duration::from_secs(2)),
        );

        assert_eq!(scope.wait_until_live().await, SyncPhase::Live);
        assert!(!scope.handle().context().unwrap().loading());
    }

    #[tokio::test]
    async fn test_panicking_bootstrap_still_goes_live() {
        let provider = PanickingProvider::default();
        let releases = provider.releases.clone();
        let scope = SessionScope::start(Arc::new(provider), AuthConfig::default());

        assert_eq!(scope.wait_until_live().await, SyncPhase::Live);
        assert!(!scope.handle().context().unwrap().loading());
        assert_eq!(releases.load(Ordering::SeqCst), 0);

        scope.shutdown().await;
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_releases_subscription_once() {
        let provider = InMemoryProvider::new();
        let scope = start(&provider);
        let handle = scope.handle();
        scope.wait_until_live().await;

        scope.shutdown().await;
        assert_eq!(provider.subscriber_count(), 0);
        assert!(!handle.is_active());
        assert_eq!(handle.context().err(), Some(AuthError::Configuration));
    }

    #[tokio::test]
    async fn test_drop_tears_down() {
        let provider = InMemoryProvider::new();
        let scope = start(&provider);
        let handle = scope.handle();
        let mut phase = scope.phase.clone();
        drop(scope);

        let _ = phase.wait_for(|p| *p == SyncPhase::TornDown).await;
        assert_eq!(provider.subscriber_count(), 0);
        assert!(!handle.is_active());
    }

    #[tokio::test]
    async fn test_use_auth_inside_provide() {
        let provider = InMemoryProvider::new();
        let scope = start(&provider);
        scope.wait_until_live().await;

        let loading = scope
            .provide(async { use_auth().map(|ctx| ctx.loading()) })
            .await;
        assert_eq!(loading, Ok(false));
    }

    #[tokio::test]
    async fn test_use_auth_outside_provide() {
        let provider = InMemoryProvider::new();
        let _scope = start(&provider);
        assert_eq!(use_auth().err(), Some(AuthError::Configuration));
    }
}
