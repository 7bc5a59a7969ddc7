//! Fake transport for testing
//!
//! Replies come from a script instead of real HTTP calls. Every request is
//! recorded so tests can inspect paths, headers and bodies afterwards.
//! Clones share the same script and recording.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;

use crate::agent::transport_types::{AgentTransport, ByteStream, TransportError};

/// One scripted reply, consumed in order by the next request
#[derive(Debug)]
pub enum FakeReply {
    /// Body of a JSON call
    Json(String),
    /// Streamed body, delivered as the given chunks
    Stream {
        chunks: Vec<Bytes>,
        /// Yielded after the chunks instead of ending normally
        error: Option<String>,
        /// Never end after the chunks (for cancellation tests)
        hang: bool,
    },
    /// Request fails before any body is read
    Error(TransportError),
    /// Request is sent but the response never arrives
    Stall,
}

/// A request as seen by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Body parsed as JSON (`Null` when absent or invalid)
    pub fn json(&self) -> serde_json::Value {
        self.body
            .as_deref()
            .and_then(|b| serde_json::from_str(b).ok())
            .unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Default)]
struct FakeState {
    replies: VecDeque<FakeReply>,
    requests: Vec<RecordedRequest>,
}

/// Fake transport for testing (uses scripted replies)
#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a JSON reply
    pub fn push_json(&self, body: &str) -> &Self {
        self.push(FakeReply::Json(body.to_string()))
    }

    /// Queue a streamed reply split into `chunk_size`-byte chunks
    ///
    /// Chunk boundaries ignore lines and characters on purpose.
    pub fn push_stream(&self, body: &str, chunk_size: usize) -> &Self {
        self.push(FakeReply::Stream {
            chunks: split_chunks(body.as_bytes(), chunk_size),
            error: None,
            hang: false,
        })
    }

    /// Queue a streamed reply that fails with a network error after `body`
    pub fn push_broken_stream(&self, body: &str, error: &str) -> &Self {
        self.push(FakeReply::Stream {
            chunks: split_chunks(body.as_bytes(), body.len()),
            error: Some(error.to_string()),
            hang: false,
        })
    }

    /// Queue a streamed reply that stalls forever after `body`
    pub fn push_hanging_stream(&self, body: &str) -> &Self {
        self.push(FakeReply::Stream {
            chunks: split_chunks(body.as_bytes(), body.len()),
            error: None,
            hang: true,
        })
    }

    /// Queue a request that never gets response headers
    pub fn push_stalled_open(&self) -> &Self {
        self.push(FakeReply::Stall)
    }

    /// Queue a request-level failure
    pub fn push_error(&self, error: TransportError) -> &Self {
        self.push(FakeReply::Error(error))
    }

    pub fn push(&self, reply: FakeReply) -> &Self {
        self.lock().replies.push_back(reply);
        self
    }

    /// Requests seen so far, in order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Scripted replies not consumed yet
    pub fn remaining(&self) -> usize {
        self.lock().replies.len()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_reply(
        &self,
        method: &'static str,
        url: &str,
        headers: &[(&str, &str)],
        body: Option<&str>,
    ) -> Result<FakeReply, TransportError> {
        let mut state = self.lock();
        state.requests.push(RecordedRequest {
            method,
            url: url.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: body.map(str::to_string),
        });
        state
            .replies
            .pop_front()
            .ok_or_else(|| TransportError::Network(format!("no scripted reply for {} {}", method, url)))
    }

    async fn into_json(reply: FakeReply) -> Result<String, TransportError> {
        match reply {
            FakeReply::Json(body) => Ok(body),
            FakeReply::Error(err) => Err(err),
            FakeReply::Stall => futures::future::pending().await,
            FakeReply::Stream { .. } => Err(TransportError::Network(
                "scripted stream where JSON was expected".to_string(),
            )),
        }
    }
}

fn split_chunks(body: &[u8], chunk_size: usize) -> Vec<Bytes> {
    body.chunks(chunk_size.max(1))
        .map(Bytes::copy_from_slice)
        .collect()
}

#[async_trait]
impl AgentTransport for FakeTransport {
    async fn get_json(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, TransportError> {
        let reply = self.next_reply("GET", url, headers, None)?;
        Self::into_json(reply).await
    }

    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> Result<String, TransportError> {
        let reply = self.next_reply("POST", url, headers, Some(body))?;
        Self::into_json(reply).await
    }

    async fn post_stream(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> Result<ByteStream, TransportError> {
        match self.next_reply("POST", url, headers, Some(body))? {
            FakeReply::Stream {
                chunks,
                error,
                hang,
            } => {
                let head = stream::iter(chunks.into_iter().map(Ok::<Bytes, TransportError>));
                let tail: ByteStream = match (error, hang) {
                    (Some(message), _) => Box::pin(stream::iter([Err::<Bytes, _>(
                        TransportError::Network(message),
                    )])),
                    (None, true) => Box::pin(stream::pending::<Result<Bytes, TransportError>>()),
                    (None, false) => Box::pin(stream::empty::<Result<Bytes, TransportError>>()),
                };
                Ok(Box::pin(futures::StreamExt::chain(head, tail)))
            }
            FakeReply::Json(body) => Ok(Box::pin(stream::iter([Ok::<_, TransportError>(Bytes::from(body))]))),
            FakeReply::Error(err) => Err(err),
            FakeReply::Stall => futures::future::pending().await,
        }
    }
}
