use thiserror::Error;

/// Errors reported by an identity provider, whatever shape it used on
/// the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{message}")]
    Rejected {
        message: String,
        status: Option<u16>,
    },

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    pub fn rejected(message: impl Into<String>, status: u16) -> Self {
        ProviderError::Rejected {
            message: message.into(),
            status: Some(status),
        }
    }
}
