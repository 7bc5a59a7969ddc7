//! HTTP transport for the agent service
//!
//! Concrete enum over the real and fake transports so the client does not
//! need a boxed trait object.

use async_trait::async_trait;

pub use crate::agent::transport_fake::{FakeReply, FakeTransport, RecordedRequest};
pub use crate::agent::transport_http::HttpTransport;
pub use crate::agent::transport_types::{AgentTransport, ByteStream, TransportError};

/// Concrete transport enum
#[derive(Debug, Clone)]
pub enum Transport {
    Http(HttpTransport),
    Fake(FakeTransport),
}

#[async_trait]
impl AgentTransport for Transport {
    async fn get_json(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, TransportError> {
        match self {
            Transport::Http(t) => t.get_json(url, headers).await,
            Transport::Fake(t) => t.get_json(url, headers).await,
        }
    }

    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> Result<String, TransportError> {
        match self {
            Transport::Http(t) => t.post_json(url, headers, body).await,
            Transport::Fake(t) => t.post_json(url, headers, body).await,
        }
    }

    async fn post_stream(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> Result<ByteStream, TransportError> {
        match self {
            Transport::Http(t) => t.post_stream(url, headers, body).await,
            Transport::Fake(t) => t.post_stream(url, headers, body).await,
        }
    }
}

impl From<HttpTransport> for Transport {
    fn from(t: HttpTransport) -> Self {
        Transport::Http(t)
    }
}

impl From<FakeTransport> for Transport {
    fn from(t: FakeTransport) -> Self {
        Transport::Fake(t)
    }
}
