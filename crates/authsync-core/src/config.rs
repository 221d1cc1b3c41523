//! Runtime settings for a session scope.

use std::time::Duration;

/// How long the bootstrap fetch may take before the scope gives up and
/// treats the user as signed out.
/// 10s covers slow networks without leaving a spinner up indefinitely.
const DEFAULT_BOOTSTRAP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthConfig {
    pub bootstrap_timeout: Duration,
}

impl AuthConfig {
    pub fn with_bootstrap_timeout(mut self, timeout: Duration) -> Self {
        self.bootstrap_timeout = timeout;
        self
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            bootstrap_timeout: Duration::from_secs(DEFAULT_BOOTSTRAP_TIMEOUT_SECS),
        }
    }
}
