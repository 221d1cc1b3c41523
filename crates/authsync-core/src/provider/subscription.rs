use std::fmt;

use tokio::sync::mpsc;
use tracing::debug;

use crate::auth::AuthChangeEvent;

type Release = Box<dyn FnOnce() + Send>;

/// Handle on a provider's change stream.
///
/// The release callback runs exactly once: on [`Subscription::unsubscribe`]
/// or, failing that, when the handle is dropped.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<AuthChangeEvent>,
    release: Option<Release>,
}

impl Subscription {
    pub fn new(
        events: mpsc::UnboundedReceiver<AuthChangeEvent>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            events,
            release: Some(Box::new(release)),
        }
    }

    /// Next change event, or `None` once the provider side has gone away
    /// or the handle was released.
    pub async fn recv(&mut self) -> Option<AuthChangeEvent> {
        self.events.recv().await
    }

    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(release) = self.release.take() {
            self.events.close();
            release();
            debug!("Subscription released");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
