//! Agent service client
//!
//! - `transport*`: HTTP plumbing (reqwest, plus a scripted fake for tests)
//! - `api`: request/response types and the call layer
//! - `credentials`: cached bearer token
//! - `client`: `SessionClient`, which drives an agent session end to end

pub mod api;
pub mod client;
pub mod credentials;
pub mod transport;
pub mod transport_fake;
pub mod transport_http;
pub mod transport_types;

pub use api::{AgentApi, Book, ChapterContent, Provider};
pub use client::{CancelHandle, SessionClient, StreamOutcome, SuggestParams};
pub use credentials::CredentialStore;
pub use transport::{AgentTransport, FakeTransport, HttpTransport, Transport, TransportError};
