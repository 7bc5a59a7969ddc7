//! Agent session state machine
//!
//! # State Machine
//!
//! ```text
//!   IDLE ──suggest──▶ STREAMING ──done/error/failure──▶ READY
//!    ▲                    ▲                              │ │ │
//!    │                    └──opened── REVISING ◀─revise──┘ │ │
//!    ├────────────────discard──────────────────────────────┘ │
//!    │                                                       │
//!    └──reset── APPROVED ◀──────────approve──────────────────┘
//!
//!   cancel: any non-idle state ──▶ IDLE
//! ```
//!
//! Transitions are plain functions of `(session, event)`. They perform no
//! I/O; `SessionClient` does the network work and feeds the results in.
//! A rejected event leaves the session untouched.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::selection::Selection;
use crate::wire::WireEvent;

/// Recorded as the error when the transport closes before `done`/`error`
pub const INCOMPLETE_STREAM: &str = "Stream ended before completion";

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// No session; ready for a new suggestion
    Idle,
    /// A stream is open and events are being applied
    Streaming,
    /// Stream finished (possibly with an error); revise/approve/discard allowed
    Ready,
    /// Revision requested, stream not open yet
    Revising,
    /// Suggestion accepted; terminal until reset
    Approved,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "IDLE"),
            SessionState::Streaming => write!(f, "STREAMING"),
            SessionState::Ready => write!(f, "READY"),
            SessionState::Revising => write!(f, "REVISING"),
            SessionState::Approved => write!(f, "APPROVED"),
        }
    }
}

/// Where an approval lands, decided once at approval time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApproveTarget {
    /// The suggestion is already merged into the editable buffer; the
    /// editing surface saves it. No remote call.
    LocalBuffer,
    /// Ask the service to commit the session's result to stored content
    RemoteCommit {
        book_slug: String,
        chapter_slug: String,
    },
}

impl ApproveTarget {
    /// Local edits win: once the buffer has unsaved changes the server copy is stale
    pub fn for_buffer(has_local_edits: bool, book_slug: &str, chapter_slug: &str) -> Self {
        if has_local_edits {
            ApproveTarget::LocalBuffer
        } else {
            ApproveTarget::RemoteCommit {
                book_slug: book_slug.to_string(),
                chapter_slug: chapter_slug.to_string(),
            }
        }
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// New suggestion for `selection`
    Suggest { selection: Selection },
    /// Revision of the current suggestion
    Revise,
    /// Revise stream accepted by the service
    StreamOpened,
    /// Decoded event from the open stream
    Wire(WireEvent),
    /// Transport error while opening or reading the stream
    TransportFailed { message: String },
    /// Transport closed
    StreamEnded,
    /// Approval call succeeded (or local approval)
    Approved,
    /// Approval call failed
    ApproveFailed { message: String },
    Discard,
    Cancel,
    /// Start over for a new selection
    Reset,
}

/// What observers should hear about a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    SessionStarted { session_id: String },
    Delta { text: String },
    /// The stream completed; `text` is the final replacement
    SuggestionComplete { text: String },
    /// The stream failed; `partial` is whatever arrived before the failure
    StreamFailed { error: String, partial: String },
    Approved,
    Discarded,
    Cancelled,
}

impl SessionNotice {
    /// Ends the current stream
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionNotice::SuggestionComplete { .. } | SessionNotice::StreamFailed { .. }
        )
    }
}

/// Rejected state machine requests
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Cannot {action} while session is {state}")]
    InvalidTransition {
        state: SessionState,
        action: &'static str,
    },

    #[error("No server session to {action}")]
    NoSession { action: &'static str },
}

/// The single live agent session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSession {
    session_id: Option<String>,
    state: SessionState,
    accumulated_text: String,
    last_error: Option<String>,
    selection: Option<Selection>,
    id_announced: bool,
}

impl Default for AgentSession {
    fn default() -> Self {
        Self {
            session_id: None,
            state: SessionState::Idle,
            accumulated_text: String::new(),
            last_error: None,
            selection: None,
            id_announced: false,
        }
    }
}

impl AgentSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Suggestion text so far (final replacement once `Ready`)
    pub fn accumulated_text(&self) -> &str {
        &self.accumulated_text
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Selection the current suggestion was requested for
    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// False while a stream is in flight; the editing surface gates new
    /// submissions on this
    pub fn can_submit(&self) -> bool {
        !matches!(self.state, SessionState::Streaming | SessionState::Revising)
    }

    /// Check that an approval may start and return the session id it needs
    pub fn check_approve(&self, target: &ApproveTarget) -> Result<Option<&str>, SessionError> {
        if self.state != SessionState::Ready {
            return Err(self.invalid("approve"));
        }
        match target {
            ApproveTarget::LocalBuffer => Ok(self.session_id()),
            ApproveTarget::RemoteCommit { .. } => self
                .session_id()
                .map(Some)
                .ok_or(SessionError::NoSession { action: "approve" }),
        }
    }

    /// Apply one event
    pub fn apply(&mut self, event: SessionEvent) -> Result<Option<SessionNotice>, SessionError> {
        use SessionState::*;

        match (self.state, event) {
            (Idle | Ready, SessionEvent::Suggest { selection }) => {
                self.clear();
                self.selection = Some(selection);
                self.enter(Streaming);
                Ok(None)
            }

            (Ready, SessionEvent::Revise) => {
                if self.session_id.is_none() {
                    return Err(SessionError::NoSession { action: "revise" });
                }
                self.accumulated_text.clear();
                self.last_error = None;
                self.id_announced = false;
                self.enter(Revising);
                Ok(None)
            }

            (Revising, SessionEvent::StreamOpened) => {
                self.enter(Streaming);
                Ok(None)
            }
            (Streaming, SessionEvent::StreamOpened) => Ok(None),

            (Streaming, SessionEvent::Wire(wire)) => Ok(self.apply_wire(wire)),
            // The service announces the session id after `done`
            (Ready, SessionEvent::Wire(WireEvent::SessionStarted { session_id })) => {
                Ok(self.record_session(session_id))
            }
            (Ready, SessionEvent::Wire(wire)) => {
                debug!(?wire, "ignoring event after end of suggestion");
                Ok(None)
            }

            (Streaming | Revising, SessionEvent::TransportFailed { message }) => {
                Ok(Some(self.fail(message)))
            }

            (Ready, SessionEvent::TransportFailed { message }) => {
                debug!(error = %message, "transport error after end of suggestion");
                Ok(None)
            }

            (Streaming, SessionEvent::StreamEnded) => Ok(Some(self.fail(INCOMPLETE_STREAM.to_string()))),
            // Normal close after a terminal event
            (Ready, SessionEvent::StreamEnded) => Ok(None),

            (Ready, SessionEvent::Approved) => {
                self.clear();
                self.enter(Approved);
                Ok(Some(SessionNotice::Approved))
            }

            (Ready, SessionEvent::ApproveFailed { message }) => {
                warn!(error = %message, "approval failed");
                self.last_error = Some(message);
                Ok(None)
            }

            (Ready, SessionEvent::Discard) => {
                self.clear();
                self.enter(Idle);
                Ok(Some(SessionNotice::Discarded))
            }

            (Idle, SessionEvent::Cancel) => Ok(None),
            (_, SessionEvent::Cancel) => {
                self.clear();
                self.enter(Idle);
                Ok(Some(SessionNotice::Cancelled))
            }

            (Idle | Approved, SessionEvent::Reset) => {
                self.clear();
                self.enter(Idle);
                Ok(None)
            }

            (state, event) => Err(SessionError::InvalidTransition {
                state,
                action: action_name(&event),
            }),
        }
    }

    fn apply_wire(&mut self, wire: WireEvent) -> Option<SessionNotice> {
        match wire {
            WireEvent::Delta { text } => {
                self.accumulated_text.push_str(&text);
                Some(SessionNotice::Delta { text })
            }
            WireEvent::SessionStarted { session_id } => self.record_session(session_id),
            WireEvent::Done { replacement } => {
                self.accumulated_text = replacement;
                self.enter(SessionState::Ready);
                Some(SessionNotice::SuggestionComplete {
                    text: self.accumulated_text.clone(),
                })
            }
            WireEvent::Error { message } => Some(self.fail(message)),
        }
    }

    /// First announcement per stream wins; a revision may re-announce the same id
    fn record_session(&mut self, session_id: String) -> Option<SessionNotice> {
        if self.id_announced {
            warn!(
                ignored = %session_id,
                current = ?self.session_id,
                "duplicate session announcement"
            );
            return None;
        }
        self.id_announced = true;
        if self.session_id.as_deref() == Some(session_id.as_str()) {
            return None;
        }
        debug!(session_id = %session_id, "session started");
        self.session_id = Some(session_id.clone());
        Some(SessionNotice::SessionStarted { session_id })
    }

    /// Stream failure: keep partial text, record the error
    fn fail(&mut self, message: String) -> SessionNotice {
        warn!(
            error = %message,
            partial_len = self.accumulated_text.len(),
            "suggestion stream failed"
        );
        self.last_error = Some(message.clone());
        self.enter(SessionState::Ready);
        SessionNotice::StreamFailed {
            error: message,
            partial: self.accumulated_text.clone(),
        }
    }

    fn clear(&mut self) {
        self.session_id = None;
        self.accumulated_text.clear();
        self.last_error = None;
        self.selection = None;
        self.id_announced = false;
    }

    fn enter(&mut self, next: SessionState) {
        if self.state != next {
            info!(from = %self.state, to = %next, "session transition");
            self.state = next;
        }
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            state: self.state,
            action,
        }
    }
}

fn action_name(event: &SessionEvent) -> &'static str {
    match event {
        SessionEvent::Suggest { .. } => "suggest",
        SessionEvent::Revise => "revise",
        SessionEvent::StreamOpened => "open stream",
        SessionEvent::Wire(_) => "apply wire event",
        SessionEvent::TransportFailed { .. } => "record transport failure",
        SessionEvent::StreamEnded => "end stream",
        SessionEvent::Approved | SessionEvent::ApproveFailed { .. } => "approve",
        SessionEvent::Discard => "discard",
        SessionEvent::Cancel => "cancel",
        SessionEvent::Reset => "reset",
    }
}
