//! Agent service API
//!
//! Request/response types and the thin call layer over [`Transport`]. Every
//! call carries the bearer credential; a 401 on any call clears it.
//! Idempotent reads go through the retry policy, streams never do.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zenedit_core::RetryPolicy;

use crate::agent::credentials::CredentialStore;
use crate::agent::transport::{AgentTransport, ByteStream, Transport};
use crate::error::{ClientError, Result};

/// Generation backend selected per request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Anthropic,
    OpenAi,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Anthropic => write!(f, "anthropic"),
            Provider::OpenAi => write!(f, "openai"),
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" => Ok(Provider::Anthropic),
            "openai" => Ok(Provider::OpenAi),
            other => Err(format!("Unknown provider: {} (expected anthropic or openai)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestRequest {
    pub book_slug: String,
    pub chapter_slug: String,
    pub selection_start: usize,
    pub selection_end: usize,
    pub prompt: String,
    pub provider: Provider,
    /// Buffer with unsaved local edits; the service uses its stored copy otherwise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviseRequest {
    pub session_id: String,
    pub prompt: String,
    pub provider: Provider,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    pub session_id: String,
    pub book_slug: String,
    pub chapter_slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveResponse {
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterContent {
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChapterSummary {
    pub slug: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Book {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub chapters: Vec<ChapterSummary>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    access_token: String,
}

/// Call layer for the agent service
#[derive(Debug)]
pub struct AgentApi {
    transport: Transport,
    base_url: String,
    credentials: CredentialStore,
    retry: RetryPolicy,
}

impl AgentApi {
    pub fn new(transport: impl Into<Transport>, base_url: &str, credentials: CredentialStore) -> Self {
        Self {
            transport: transport.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_authenticated()
    }

    /// `POST /login`; stores the returned token
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let url = self.url("/login");
        let body = serde_json::to_string(&LoginRequest { username, password })
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        let reply = match self.transport.post_json(&url, &[], &body).await {
            Ok(reply) => reply,
            Err(err) => {
                return Err(match ClientError::from(err) {
                    ClientError::Unauthorized => ClientError::LoginRejected,
                    other => other,
                })
            }
        };
        let login: LoginResponse = parse(&reply)?;
        self.credentials
            .store(login.access_token)
            .map_err(|e| ClientError::Transport(e.into()))?;
        info!(username, "logged in");
        Ok(())
    }

    /// `GET /books` (retried)
    pub async fn fetch_books(&mut self) -> Result<Vec<Book>> {
        let url = self.url("/books");
        let result = self.get_retried(&url).await;
        self.guard(result)
    }

    /// `GET /books/{book}/chapters/{chapter}` (retried)
    pub async fn fetch_chapter(&mut self, book_slug: &str, chapter_slug: &str) -> Result<ChapterContent> {
        let url = self.url(&format!("/books/{}/chapters/{}", book_slug, chapter_slug));
        let result = self.get_retried(&url).await;
        self.guard(result)
    }

    /// `POST /agent/suggest`; returns the raw event stream
    pub async fn open_suggest(&mut self, request: &SuggestRequest) -> Result<ByteStream> {
        debug!(
            book = %request.book_slug,
            chapter = %request.chapter_slug,
            from = request.selection_start,
            to = request.selection_end,
            local_content = request.content.is_some(),
            "opening suggestion stream"
        );
        let result = self.open_stream("/agent/suggest", request).await;
        self.guard(result)
    }

    /// `POST /agent/revise`; returns the raw event stream
    pub async fn open_revise(&mut self, request: &ReviseRequest) -> Result<ByteStream> {
        debug!(session_id = %request.session_id, "opening revision stream");
        let result = self.open_stream("/agent/revise", request).await;
        self.guard(result)
    }

    /// `POST /agent/approve`
    pub async fn approve(&mut self, request: &ApproveRequest) -> Result<ApproveResponse> {
        let url = self.url("/agent/approve");
        let result = async {
            let body = serde_json::to_string(request).map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
            let auth = self.credentials.bearer();
            let reply = self.transport.post_json(&url, &headers(auth.as_deref()), &body).await?;
            parse(&reply)
        }
        .await;
        self.guard(result)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn open_stream<T: Serialize>(&self, path: &str, request: &T) -> Result<ByteStream> {
        let url = self.url(path);
        let body = serde_json::to_string(request).map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        let auth = self.credentials.bearer();
        Ok(self
            .transport
            .post_stream(&url, &headers(auth.as_deref()), &body)
            .await?)
    }

    async fn get_retried<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let auth = self.credentials.bearer();
        let auth = auth.as_deref();
        let transport = &self.transport;
        let value = self
            .retry
            .run(move || async move {
                let reply = transport.get_json(url, &headers(auth)).await?;
                parse::<T>(&reply)
            })
            .await?;
        Ok(value)
    }

    /// Clear the credential when the service rejected it
    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_unauthorized() {
                self.credentials.clear();
            }
        }
        result
    }
}

fn headers(auth: Option<&str>) -> Vec<(&'static str, &str)> {
    match auth {
        Some(value) => vec![("Authorization", value)],
        None => Vec::new(),
    }
}

fn parse<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| ClientError::InvalidResponse(e.to_string()))
}
