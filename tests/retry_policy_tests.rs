//! Retry policy integration tests
//!
//! Idempotent reads retry with exponential backoff; streams never retry.
//! Runs on a paused clock so the 1s/2s/4s schedule is checked exactly.

use std::time::Duration;

use tokio::time::Instant;
use zenedit::agent::transport::TransportError;
use zenedit::agent::{AgentApi, CredentialStore, FakeTransport};
use zenedit::ClientError;
use zenedit_core::RetryPolicy;

const CHAPTER: &str = r#"{"content":"Hello wrld","updatedAt":"2024-05-01T10:00:00Z"}"#;

fn api_with(fake: &FakeTransport) -> AgentApi {
    AgentApi::new(
        fake.clone(),
        "http://svc/api",
        CredentialStore::in_memory(Some("tok".to_string())),
    )
}

fn unavailable() -> TransportError {
    TransportError::Http {
        status: 503,
        message: "HTTP 503".to_string(),
    }
}

// =============================================================================
// TEST A: Backoff schedule
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_recovers_after_two_failures() {
    let fake = FakeTransport::new();
    fake.push_error(unavailable())
        .push_error(TransportError::Network("connection refused".to_string()))
        .push_json(CHAPTER);
    let mut api = api_with(&fake);

    let start = Instant::now();
    let chapter = api.fetch_chapter("book", "ch-1").await.unwrap();

    assert_eq!(chapter.content, "Hello wrld");
    // 1s + 2s
    assert_eq!(start.elapsed(), Duration::from_secs(3));
    assert_eq!(fake.requests().len(), 3);
    assert!(fake
        .requests()
        .iter()
        .all(|r| r.url == "http://svc/api/books/book/chapters/ch-1"));
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_four_attempts() {
    let fake = FakeTransport::new();
    for _ in 0..4 {
        fake.push_error(unavailable());
    }
    let mut api = api_with(&fake);

    let start = Instant::now();
    let err = api.fetch_chapter("book", "ch-1").await.unwrap_err();

    // 1s + 2s + 4s, then the last error surfaces
    assert_eq!(start.elapsed(), Duration::from_secs(7));
    match err {
        ClientError::RetryExhausted { attempts, last } => {
            assert_eq!(attempts, 4);
            assert!(matches!(*last, ClientError::Transport(TransportError::Http { status: 503, .. })));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(fake.remaining(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_custom_policy_schedule() {
    let fake = FakeTransport::new();
    fake.push_error(unavailable())
        .push_error(unavailable())
        .push_json("[]");
    let mut api = api_with(&fake).with_retry(RetryPolicy::new(2, Duration::from_millis(250), 3));

    let start = Instant::now();
    let books = api.fetch_books().await.unwrap();

    assert!(books.is_empty());
    // 250ms + 750ms
    assert_eq!(start.elapsed(), Duration::from_millis(1000));
}

// =============================================================================
// TEST B: What is never retried
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_unauthorized_is_not_retried() {
    let fake = FakeTransport::new();
    fake.push_error(TransportError::Unauthorized).push_json(CHAPTER);
    let mut api = api_with(&fake);

    let start = Instant::now();
    let err = api.fetch_chapter("book", "ch-1").await.unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(fake.requests().len(), 1);
    assert!(!api.is_authenticated(), "401 clears the credential");
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_mid_retry_stops() {
    let fake = FakeTransport::new();
    fake.push_error(unavailable())
        .push_error(TransportError::Unauthorized)
        .push_json(CHAPTER);
    let mut api = api_with(&fake);

    let start = Instant::now();
    let err = api.fetch_chapter("book", "ch-1").await.unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(start.elapsed(), Duration::from_secs(1));
    assert_eq!(fake.remaining(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stream_open_is_not_retried() {
    use zenedit::agent::api::{Provider, SuggestRequest};

    let fake = FakeTransport::new();
    fake.push_error(unavailable());
    let mut api = api_with(&fake);

    let request = SuggestRequest {
        book_slug: "book".to_string(),
        chapter_slug: "ch-1".to_string(),
        selection_start: 6,
        selection_end: 10,
        prompt: "fix".to_string(),
        provider: Provider::Anthropic,
        content: None,
    };
    assert!(api.open_suggest(&request).await.is_err());
    assert_eq!(fake.requests().len(), 1);
}

#[tokio::test]
async fn test_invalid_body_is_retried_then_reported() {
    let fake = FakeTransport::new();
    fake.push_json("<html>").push_json("not json");
    let mut api = api_with(&fake).with_retry(RetryPolicy::new(1, Duration::from_millis(1), 2));

    let err = api.fetch_books().await.unwrap_err();

    match err {
        ClientError::RetryExhausted { attempts, last } => {
            assert_eq!(attempts, 2);
            assert!(matches!(*last, ClientError::InvalidResponse(_)));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}
