//! ZenEdit Core
//!
//! The agent-session protocol behind AI-assisted text edits:
//! - `selection`: immutable snapshots of the user's selection (UTF-16 offsets)
//! - `wire` + `decoder`: event-stream framing into typed wire events
//! - `retry`: bounded exponential backoff for idempotent reads
//! - `session`: the agent-session state machine
//! - `merge`: offset-based splicing of replacements into a document buffer
//!
//! No HTTP lives here. The service client in the `zenedit` crate feeds
//! transport bytes into the decoder and decoded events into the session.

pub mod decoder;
pub mod merge;
pub mod retry;
pub mod selection;
pub mod session;
pub mod wire;

pub use decoder::{FrameDecoder, StreamDecoder};
pub use merge::{apply, splice, splice_checked, LinkInserter, MergeError, Splice};
pub use retry::{RetryError, RetryPolicy, Retryable};
pub use selection::{utf16_len, Selection, SelectionTracker};
pub use session::{
    AgentSession, ApproveTarget, SessionError, SessionEvent, SessionNotice, SessionState,
    INCOMPLETE_STREAM,
};
pub use wire::WireEvent;
