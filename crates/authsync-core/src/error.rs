use thiserror::Error;

use crate::provider::ProviderError;

/// Message reported when the access point is used with no live scope.
pub const OUTSIDE_SCOPE_MESSAGE: &str =
    "use_auth must be called within an active AuthProvider scope";

/// A rejected sign-up, sign-in, sign-out or reset, reduced to what a
/// form needs to show.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct OperationError {
    pub message: String,
}

impl OperationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<ProviderError> for OperationError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Rejected { message, .. } => Self::new(message),
            ProviderError::Unavailable(reason) => {
                Self::new(format!("Authentication service unavailable: {reason}"))
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Wiring defect: the access point was reached without a live scope.
    #[error("{}", OUTSIDE_SCOPE_MESSAGE)]
    Configuration,

    #[error(transparent)]
    Operation(#[from] OperationError),
}

impl AuthError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, AuthError::Configuration)
    }
}
