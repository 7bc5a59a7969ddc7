//! Transport types
//!
//! Common types shared across transport implementations.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

/// Raw response body of a streaming call
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Service answered 401; the cached credential is no longer valid
    #[error("Unauthorized")]
    Unauthorized,

    /// HTTP error (non-2xx status other than 401)
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    /// Network error (connection refused, reset, timeout, ...)
    #[error("Network error: {0}")]
    Network(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Json(err.to_string())
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status == reqwest::StatusCode::UNAUTHORIZED => TransportError::Unauthorized,
            Some(status) => TransportError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => TransportError::Network(err.to_string()),
        }
    }
}

/// Asynchronous HTTP transport
///
/// Abstraction over the HTTP client so the session client can be driven by
/// `FakeTransport` in tests. Implementations map a 401 response to
/// [`TransportError::Unauthorized`] and any other non-2xx response to
/// [`TransportError::Http`].
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// GET and return the response body
    async fn get_json(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, TransportError>;

    /// POST a JSON body and return the response body
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> Result<String, TransportError>;

    /// POST a JSON body and hand back the response body as it arrives
    ///
    /// Status errors are reported here, before any body byte is read.
    async fn post_stream(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> Result<ByteStream, TransportError>;
}

/// Pull a readable message out of an error body
///
/// The service reports failures as `{"detail": "..."}`; some proxies use
/// `{"error": "..."}`. Anything else falls back to the status line.
pub fn error_message(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["detail", "error", "message"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                return text.to_string();
            }
        }
    }
    format!("HTTP {}", status)
}
