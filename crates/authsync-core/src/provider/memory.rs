//! In-process identity provider.
//!
//! Behaves like a hosted auth service closely enough to drive the
//! synchronizer: accounts, password checks, email confirmation, session
//! issue and push notifications. It also exposes knobs for reordering and
//! failing things, which is what the tests lean on.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::{IdentityProvider, ProviderError, Subscription};
use crate::auth::{AuthChangeEvent, AuthChangeKind, Session, User};

// ============================================================================
// Constants
// ============================================================================

/// Minimum accepted password length.
const MIN_PASSWORD_LENGTH: usize = 6;

/// Lifetime of an issued access token.
const SESSION_LIFETIME_MINUTES: i64 = 60;

/// Length of generated access/refresh tokens.
const TOKEN_LENGTH: usize = 40;

/// Provider operations that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SignUp,
    SignIn,
    SignOut,
    PasswordReset,
}

struct Account {
    user: User,
    password: String,
}

enum BootstrapRelease {
    Snapshot,
    With(Option<Session>),
    Fail(String),
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, Account>,
    current: Option<Session>,
    subscribers: HashMap<u64, mpsc::UnboundedSender<AuthChangeEvent>>,
    next_subscriber_id: u64,
    auto_confirm: bool,
    bootstrap_failure: Option<String>,
    held_bootstrap: Option<oneshot::Receiver<BootstrapRelease>>,
    failures: HashMap<Operation, String>,
    defer_events: bool,
    pending_events: Vec<AuthChangeEvent>,
    reset_requests: Vec<String>,
    latency: Option<StdDuration>,
}

impl Inner {
    fn publish(&mut self, event: AuthChangeEvent) {
        if self.defer_events {
            self.pending_events.push(event);
            return;
        }
        debug!(kind = event.kind.as_str(), subscribers = self.subscribers.len(), "Publishing auth event");
        // Listeners that went away without unsubscribing are pruned here.
        self.subscribers.retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    fn take_failure(&mut self, op: Operation) -> Result<(), ProviderError> {
        match self.failures.remove(&op) {
            Some(message) => Err(ProviderError::Rejected {
                message,
                status: None,
            }),
            None => Ok(()),
        }
    }
}

/// Delays the answer to the next bootstrap fetch until released.
///
/// Dropping the gate without calling anything behaves like [`release`].
///
/// [`release`]: BootstrapGate::release
pub struct BootstrapGate {
    tx: oneshot::Sender<BootstrapRelease>,
}

impl BootstrapGate {
    /// Answer with the session that was current when the fetch was issued.
    pub fn release(self) {
        let _ = self.tx.send(BootstrapRelease::Snapshot);
    }

    pub fn resolve_with(self, session: Option<Session>) {
        let _ = self.tx.send(BootstrapRelease::With(session));
    }

    pub fn fail(self, message: impl Into<String>) {
        let _ = self.tx.send(BootstrapRelease::Fail(message.into()));
    }
}

/// Identity provider kept entirely in memory.
///
/// Clone is cheap and clones share state.
#[derive(Clone, Default)]
pub struct InMemoryProvider {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Sign users in straight after sign-up instead of waiting for email
    /// confirmation.
    pub fn with_auto_confirm(self, auto_confirm: bool) -> Self {
        self.lock().auto_confirm = auto_confirm;
        self
    }

    /// Add artificial latency to every mutation call.
    pub fn set_latency(&self, latency: Option<StdDuration>) {
        self.lock().latency = latency;
    }

    // =========================================================================
    // Test controls
    // =========================================================================

    /// Hold the next bootstrap fetch until the returned gate is released.
    pub fn hold_bootstrap(&self) -> BootstrapGate {
        let (tx, rx) = oneshot::channel();
        self.lock().held_bootstrap = Some(rx);
        BootstrapGate { tx }
    }

    /// Make every bootstrap fetch fail with `message`.
    pub fn fail_bootstrap(&self, message: impl Into<String>) {
        self.lock().bootstrap_failure = Some(message.into());
    }

    /// Reject the next call of `op` with `message`.
    pub fn fail_next(&self, op: Operation, message: impl Into<String>) {
        self.lock().failures.insert(op, message.into());
    }

    /// Queue events produced by mutations until [`flush_events`] is called.
    ///
    /// [`flush_events`]: InMemoryProvider::flush_events
    pub fn defer_events(&self, defer: bool) {
        self.lock().defer_events = defer;
    }

    /// Deliver queued events in the order they were produced.
    pub fn flush_events(&self) -> usize {
        let mut inner = self.lock();
        let pending = std::mem::take(&mut inner.pending_events);
        let count = pending.len();
        let deferred = std::mem::replace(&mut inner.defer_events, false);
        for event in pending {
            inner.publish(event);
        }
        inner.defer_events = deferred;
        count
    }

    /// Push an event to subscribers as if the provider had produced it.
    /// The provider's own notion of the current session follows the event.
    pub fn emit(&self, event: AuthChangeEvent) {
        let mut inner = self.lock();
        inner.current = event.session.clone();
        let deferred = std::mem::replace(&mut inner.defer_events, false);
        inner.publish(event);
        inner.defer_events = deferred;
    }

    /// Rotate the tokens of the current session and announce it.
    pub fn refresh_session(&self) -> Option<Session> {
        let mut inner = self.lock();
        let user = inner.current.as_ref()?.user.clone();
        let session = issue_session(user);
        inner.current = Some(session.clone());
        inner.publish(AuthChangeEvent::new(
            AuthChangeKind::TokenRefreshed,
            Some(session.clone()),
        ));
        Some(session)
    }

    /// Complete the "check your email" step for a pending account.
    pub fn confirm_email(&self, email: &str) -> bool {
        let mut inner = self.lock();
        match inner.accounts.get_mut(&normalize_email(email)) {
            Some(account) => {
                account.user.email_confirmed_at.get_or_insert_with(Utc::now);
                true
            }
            None => false,
        }
    }

    pub fn current_session(&self) -> Option<Session> {
        self.lock().current.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn reset_requests(&self) -> Vec<String> {
        self.lock().reset_requests.clone()
    }

    async fn simulate_latency(&self) {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<String, ProviderError> {
    let email = normalize_email(email);
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(ProviderError::rejected(
            "Unable to validate email address: invalid format",
            400,
        )),
    }
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

fn issue_session(user: User) -> Session {
    Session {
        access_token: generate_token(),
        refresh_token: generate_token(),
        expires_at: Utc::now() + Duration::minutes(SESSION_LIFETIME_MINUTES),
        user,
    }
}

#[async_trait]
impl IdentityProvider for InMemoryProvider {
    async fn get_current_session(&self) -> Result<Option<Session>, ProviderError> {
        let (snapshot, held) = {
            let mut inner = self.lock();
            if let Some(message) = inner.bootstrap_failure.clone() {
                return Err(ProviderError::Unavailable(message));
            }
            (inner.current.clone(), inner.held_bootstrap.take())
        };

        let Some(held) = held else {
            return Ok(snapshot);
        };

        debug!("Bootstrap fetch held");
        match held.await {
            Ok(BootstrapRelease::Snapshot) | Err(_) => Ok(snapshot),
            Ok(BootstrapRelease::With(session)) => Ok(session),
            Ok(BootstrapRelease::Fail(message)) => Err(ProviderError::Unavailable(message)),
        }
    }

    fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.lock();
            let id = inner.next_subscriber_id;
            inner.next_subscriber_id += 1;
            inner.subscribers.insert(id, tx);
            id
        };
        debug!(subscriber = id, "Subscriber registered");

        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        Subscription::new(rx, move || {
            if let Some(inner) = weak.upgrade() {
                let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
                inner.subscribers.remove(&id);
            }
        })
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<(), ProviderError> {
        self.simulate_latency().await;
        let mut inner = self.lock();
        inner.take_failure(Operation::SignUp)?;

        let email = validate_email(email)?;
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(ProviderError::rejected(
                format!("Password should be at least {MIN_PASSWORD_LENGTH} characters"),
                422,
            ));
        }
        if inner.accounts.contains_key(&email) {
            return Err(ProviderError::rejected("User already registered", 422));
        }

        let now = Utc::now();
        let user = User {
            id: generate_token(),
            email: email.clone(),
            created_at: now,
            email_confirmed_at: inner.auto_confirm.then_some(now),
        };
        inner.accounts.insert(
            email.clone(),
            Account {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        info!(email = %email, confirmed = inner.auto_confirm, "Account created");

        if inner.auto_confirm {
            let session = issue_session(user);
            inner.current = Some(session.clone());
            inner.publish(AuthChangeEvent::signed_in(session));
        }
        Ok(())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(), ProviderError> {
        self.simulate_latency().await;
        let mut inner = self.lock();
        inner.take_failure(Operation::SignIn)?;

        let email = normalize_email(email);
        let user = match inner.accounts.get(&email) {
            Some(account) if account.password == password => account.user.clone(),
            _ => {
                warn!(email = %email, "Rejected sign-in");
                return Err(ProviderError::rejected("Invalid login credentials", 400));
            }
        };
        if !user.is_confirmed() {
            return Err(ProviderError::rejected("Email not confirmed", 400));
        }

        let session = issue_session(user);
        inner.current = Some(session.clone());
        inner.publish(AuthChangeEvent::signed_in(session));
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.simulate_latency().await;
        let mut inner = self.lock();
        inner.take_failure(Operation::SignOut)?;

        if inner.current.take().is_some() {
            inner.publish(AuthChangeEvent::signed_out());
        }
        Ok(())
    }

    async fn request_password_reset(&self, email: &str) -> Result<(), ProviderError> {
        self.simulate_latency().await;
        let mut inner = self.lock();
        inner.take_failure(Operation::PasswordReset)?;

        // Unknown addresses succeed too, so callers cannot probe for accounts.
        let email = validate_email(email)?;
        debug!(email = %email, known = inner.accounts.contains_key(&email), "Password reset requested");
        inner.reset_requests.push(email);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirmed_provider() -> InMemoryProvider {
        InMemoryProvider::new().with_auto_confirm(true)
    }

    #[tokio::test]
    async fn test_sign_up_validates_password_length() {
        let provider = confirmed_provider();
        let err = provider.sign_up("ada@example.com", "12345").await.unwrap_err();
        assert_eq!(err.to_string(), "Password should be at least 6 characters");
    }

    #[tokio::test]
    async fn test_sign_up_rejects_duplicates_case_insensitively() {
        let provider = confirmed_provider();
        provider.sign_up("ada@example.com", "hunter22").await.unwrap();
        let err = provider.sign_up("ADA@example.com", "hunter22").await.unwrap_err();
        assert_eq!(err.to_string(), "User already registered");
    }

    #[tokio::test]
    async fn test_sign_up_rejects_malformed_email() {
        let provider = confirmed_provider();
        let err = provider.sign_up("not-an-email", "hunter22").await.unwrap_err();
        assert!(matches!(err, ProviderError::Rejected { status: Some(400), .. }));
    }

    #[tokio::test]
    async fn test_auto_confirm_sign_up_publishes_signed_in() {
        let provider = confirmed_provider();
        let mut sub = provider.subscribe();
        provider.sign_up("ada@example.com", "hunter22").await.unwrap();

        let event = sub.recv().await.unwrap();
        assert_eq!(event.kind, AuthChangeKind::SignedIn);
        assert_eq!(event.session.unwrap().user.email, "ada@example.com");
    }

    #[tokio::test]
    async fn test_unconfirmed_sign_up_publishes_nothing_and_blocks_sign_in() {
        let provider = InMemoryProvider::new();
        let sub = provider.subscribe();
        provider.sign_up("ada@example.com", "hunter22").await.unwrap();
        assert!(provider.current_session().is_none());

        let err = provider
            .sign_in_with_password("ada@example.com", "hunter22")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Email not confirmed");

        assert!(provider.confirm_email("ada@example.com"));
        provider
            .sign_in_with_password("ada@example.com", "hunter22")
            .await
            .unwrap();
        assert!(provider.current_session().is_some());
        drop(sub);
    }

    #[tokio::test]
    async fn test_sign_in_wrong_password() {
        let provider = confirmed_provider();
        provider.sign_up("ada@example.com", "hunter22").await.unwrap();
        let err = provider
            .sign_in_with_password("ada@example.com", "wrong-password")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid login credentials");
    }

    #[tokio::test]
    async fn test_sign_out_without_session_is_silent() {
        let provider = confirmed_provider();
        let mut sub = provider.subscribe();
        provider.sign_out().await.unwrap();
        provider.emit(AuthChangeEvent::signed_out());
        // Only the explicit emit arrives.
        assert_eq!(sub.recv().await, Some(AuthChangeEvent::signed_out()));
        assert_eq!(provider.flush_events(), 0);
    }

    #[tokio::test]
    async fn test_password_reset_records_unknown_addresses() {
        let provider = confirmed_provider();
        provider
            .request_password_reset("Nobody@Example.com")
            .await
            .unwrap();
        assert_eq!(provider.reset_requests(), vec!["nobody@example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_fail_next_applies_once() {
        let provider = confirmed_provider();
        provider.fail_next(Operation::SignOut, "Network down");
        assert_eq!(provider.sign_out().await.unwrap_err().to_string(), "Network down");
        assert!(provider.sign_out().await.is_ok());
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_listener() {
        let provider = confirmed_provider();
        let sub = provider.subscribe();
        let other = provider.subscribe();
        assert_eq!(provider.subscriber_count(), 2);
        sub.unsubscribe();
        assert_eq!(provider.subscriber_count(), 1);
        drop(other);
        assert_eq!(provider.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_deferred_events_flush_in_order() {
        let provider = confirmed_provider();
        let mut sub = provider.subscribe();
        provider.defer_events(true);
        provider.sign_up("ada@example.com", "hunter22").await.unwrap();
        provider.sign_out().await.unwrap();

        assert_eq!(provider.flush_events(), 2);
        assert_eq!(sub.recv().await.unwrap().kind, AuthChangeKind::SignedIn);
        assert_eq!(sub.recv().await.unwrap().kind, AuthChangeKind::SignedOut);
    }

    #[tokio::test]
    async fn test_held_bootstrap_returns_stale_snapshot() {
        let provider = confirmed_provider();
        let gate = provider.hold_bootstrap();
        let fetch = provider.get_current_session();
        tokio::pin!(fetch);
        assert!(futures::poll!(&mut fetch).is_pending());

        provider.sign_up("ada@example.com", "hunter22").await.unwrap();
        gate.release();

        let result = fetch.await.unwrap();
        assert!(result.is_none());
        assert!(provider.current_session().is_some());
    }

    #[tokio::test]
    async fn test_bootstrap_failure() {
        let provider = confirmed_provider();
        provider.fail_bootstrap("connection refused");
        let err = provider.get_current_session().await.unwrap_err();
        assert_eq!(err, ProviderError::Unavailable("connection refused".to_string()));
    }

    #[tokio::test]
    async fn test_refresh_session_rotates_tokens() {
        let provider = confirmed_provider();
        assert!(provider.refresh_session().is_none());
        provider.sign_up("ada@example.com", "hunter22").await.unwrap();
        let before = provider.current_session().unwrap();
        let after = provider.refresh_session().unwrap();
        assert_ne!(before.access_token, after.access_token);
        assert_eq!(before.user, after.user);
    }
}
