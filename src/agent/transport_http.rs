//! Real HTTP transport using reqwest
//!
//! JSON calls carry a per-request timeout. Streaming calls only bound the
//! connect phase: a generation can legitimately take minutes, and a hung
//! stream is ended by the user cancelling.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::debug;
use uuid::Uuid;

use crate::agent::transport_types::{error_message, AgentTransport, ByteStream, TransportError};

/// Real HTTP transport using reqwest
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    /// Timeout for non-streaming requests
    timeout: Duration,
}

impl HttpTransport {
    /// Create new transport with default timeout (30s)
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create transport with custom timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().connect_timeout(timeout).build()?;
        Ok(Self { client, timeout })
    }

    /// Apply caller headers plus a fresh `X-Request-Id` for log correlation
    fn with_headers(mut request: RequestBuilder, headers: &[(&str, &str)]) -> RequestBuilder {
        let request_id = Uuid::new_v4().to_string();
        debug!(request_id = %request_id, "sending request");
        request = request.header("X-Request-Id", request_id);
        for (key, value) in headers {
            request = request.header(*key, *value);
        }
        request
    }

    /// Map non-2xx responses to errors
    async fn check(response: Response) -> Result<Response, TransportError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(TransportError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                status: status.as_u16(),
                message: error_message(status.as_u16(), &body),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl AgentTransport for HttpTransport {
    async fn get_json(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, TransportError> {
        debug!(url, "GET");
        let request = Self::with_headers(self.client.get(url).timeout(self.timeout), headers);
        let response = Self::check(request.send().await?).await?;
        Ok(response.text().await?)
    }

    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> Result<String, TransportError> {
        debug!(url, "POST");
        let request = self
            .client
            .post(url)
            .timeout(self.timeout)
            .header("Content-Type", "application/json")
            .body(body.to_string());
        let response = Self::check(Self::with_headers(request, headers).send().await?).await?;
        Ok(response.text().await?)
    }

    async fn post_stream(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> Result<ByteStream, TransportError> {
        debug!(url, "POST (stream)");
        let request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .body(body.to_string());
        let response = Self::check(Self::with_headers(request, headers).send().await?).await?;
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from));
        Ok(Box::pin(stream))
    }
}
