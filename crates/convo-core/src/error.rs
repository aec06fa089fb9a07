//! Convo core errors

use convo_storage_traits::StorageError;

use crate::api::TransportError;
use crate::config::ConfigError;
use crate::crypto::CryptoError;

/// Typed outcome of a rejected or failed call to the coordination service.
///
/// Also used for the local fast-fail checks that mirror a server rejection, so a
/// caller sees the same category whether the local roster or the server refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversationError {
    /// The caller lacks the rights for this operation
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// The target of the operation is not acceptable
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    /// The conversation, member or report does not exist
    #[error("not found: {0}")]
    NotFound(String),
    /// Another operation is in flight, or the request contradicts current state
    #[error("conflict: {0}")]
    Conflict(String),
    /// 5xx response or transport failure
    #[error("server error: {0}")]
    ServerError(String),
    /// No response within the request timeout
    #[error("request timed out")]
    Timeout,
}

impl ConversationError {
    /// Map a non-2xx status code
    pub fn from_status<S>(status: u16, message: S) -> Self
    where
        S: Into<String>,
    {
        let message = message.into();
        match status {
            400 | 422 => Self::InvalidTarget(message),
            401 | 403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            409 => Self::Conflict(message),
            408 | 504 => Self::Timeout,
            _ => Self::ServerError(format!("status {status}: {message}")),
        }
    }

    /// Whether a retry with the same idempotency key may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ServerError(_) | Self::Timeout)
    }
}

impl From<TransportError> for ConversationError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout => Self::Timeout,
            TransportError::Connection(message) => Self::ServerError(message),
        }
    }
}

/// Convo core error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Local database failure
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Rejected by the coordination service or a local pre-check
    #[error(transparent)]
    Conversation(#[from] ConversationError),
    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The crypto engine failed
    #[error("crypto error: {0}")]
    Crypto(String),
}

impl From<CryptoError> for Error {
    fn from(e: CryptoError) -> Self {
        Self::Crypto(e.to_string())
    }
}
