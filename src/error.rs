//! Client errors
//!
//! Only [`ClientError::Unauthorized`] is fatal to a session. Stream failures
//! never show up here: they are recorded on the session and reported through
//! `StreamOutcome`.

use zenedit_core::{MergeError, RetryError, Retryable, SessionError};

use crate::agent::transport::TransportError;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Credential rejected; the cached token has been cleared
    #[error("Unauthorized")]
    Unauthorized,

    /// Username or password refused at login
    #[error("Invalid username or password")]
    LoginRejected,

    #[error(transparent)]
    Transport(TransportError),

    /// Request rejected by the session state machine; nothing was sent
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    /// Idempotent read failed on every attempt
    #[error("Gave up after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: Box<ClientError>,
    },

    /// Response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized)
    }
}

impl Retryable for ClientError {
    fn is_authorization_failure(&self) -> bool {
        self.is_unauthorized()
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Unauthorized => ClientError::Unauthorized,
            other => ClientError::Transport(other),
        }
    }
}

impl From<RetryError<ClientError>> for ClientError {
    fn from(err: RetryError<ClientError>) -> Self {
        match err {
            RetryError::Unauthorized(err) => err,
            RetryError::Exhausted { attempts, last } => ClientError::RetryExhausted {
                attempts,
                last: Box::new(last),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_from_transport() {
        let err = ClientError::from(TransportError::Unauthorized);
        assert!(err.is_unauthorized());
        assert!(err.is_authorization_failure());

        let err = ClientError::from(TransportError::Network("reset".to_string()));
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn test_retry_exhausted_display() {
        let err = ClientError::from(RetryError::Exhausted {
            attempts: 4,
            last: ClientError::from(TransportError::Http {
                status: 503,
                message: "HTTP 503".to_string(),
            }),
        });
        assert_eq!(
            format!("{}", err),
            "Gave up after 4 attempts: HTTP error 503: HTTP 503"
        );
    }
}
