//! Session client
//!
//! Drives one [`AgentSession`] against the agent service:
//!
//! 1. Validate the request against the state machine (nothing is sent when
//!    it is rejected)
//! 2. Open the stream, decode it, and feed every event through the state
//!    machine in arrival order
//! 3. Publish each notice on the optional observer channel and return the
//!    terminal [`StreamOutcome`]
//!
//! The consumption loop is a single sequential task. Cancellation abandons
//! it through a [`CancellationToken`]; the remote stream is simply dropped.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zenedit_core::{
    AgentSession, ApproveTarget, Selection, SessionEvent, SessionNotice, StreamDecoder,
};

use crate::agent::api::{AgentApi, ApproveRequest, Provider, ReviseRequest, SuggestRequest};
use crate::agent::transport::ByteStream;
use crate::error::{ClientError, Result};

/// How a suggest or revise call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// `done` arrived; `text` is the final replacement
    Completed { text: String },
    /// Transport failure, server error event, or premature close.
    /// `partial` is visible to the user but never merged automatically.
    Failed { error: String, partial: String },
    /// Abandoned by the user
    Cancelled,
}

/// Everything needed to ask for a suggestion
#[derive(Debug, Clone)]
pub struct SuggestParams {
    pub book_slug: String,
    pub chapter_slug: String,
    pub selection: Selection,
    pub prompt: String,
    /// Current buffer when it has unsaved local edits
    pub content: Option<String>,
}

/// How long to keep reading for the trailing `session` event once the
/// terminal event has arrived
pub const TRAILING_READ_GRACE: Duration = Duration::from_secs(2);

/// Cancels whatever stream the client is opening or consuming right now
///
/// Cloneable and usable from any task. Cancelling while no stream is in
/// flight has no effect on the next one.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    current: Arc<Mutex<CancelState>>,
}

#[derive(Debug, Default)]
struct CancelState {
    token: CancellationToken,
    in_flight: bool,
}

impl CancelHandle {
    /// Returns whether a stream was in flight to receive the cancel
    pub fn cancel(&self) -> bool {
        let state = self.lock();
        state.token.cancel();
        state.in_flight
    }

    pub fn is_in_flight(&self) -> bool {
        self.lock().in_flight
    }

    /// Fresh token for a stream about to start; in flight until the guard drops
    fn begin(&self) -> (CancellationToken, InFlight) {
        let mut state = self.lock();
        state.token = CancellationToken::new();
        state.in_flight = true;
        (state.token.clone(), InFlight(self.clone()))
    }

    fn lock(&self) -> MutexGuard<'_, CancelState> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct InFlight(CancelHandle);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.lock().in_flight = false;
    }
}

#[derive(Debug)]
pub struct SessionClient {
    api: AgentApi,
    session: AgentSession,
    provider: Provider,
    observer: Option<mpsc::UnboundedSender<SessionNotice>>,
    cancel: CancelHandle,
}

impl SessionClient {
    pub fn new(api: AgentApi) -> Self {
        Self {
            api,
            session: AgentSession::new(),
            provider: Provider::default(),
            observer: None,
            cancel: CancelHandle::default(),
        }
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    /// Receive every notice as it happens (deltas included)
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionNotice> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observer = Some(tx);
        rx
    }

    pub fn session(&self) -> &AgentSession {
        &self.session
    }

    pub fn api(&self) -> &AgentApi {
        &self.api
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Request a suggestion and stream it to completion
    pub async fn suggest(&mut self, params: SuggestParams) -> Result<StreamOutcome> {
        self.session.apply(SessionEvent::Suggest {
            selection: params.selection.clone(),
        })?;
        info!(
            book = %params.book_slug,
            chapter = %params.chapter_slug,
            from = params.selection.from(),
            to = params.selection.to(),
            "requesting suggestion"
        );

        let request = SuggestRequest {
            book_slug: params.book_slug,
            chapter_slug: params.chapter_slug,
            selection_start: params.selection.from(),
            selection_end: params.selection.to(),
            prompt: params.prompt,
            provider: self.provider,
            content: params.content,
        };
        let (token, _in_flight) = self.cancel.begin();
        let opened = tokio::select! {
            _ = token.cancelled() => None,
            opened = self.api.open_suggest(&request) => Some(opened),
        };
        match opened {
            Some(opened) => self.consume(opened, &token).await,
            None => self.cancelled(),
        }
    }

    /// Ask for a revision of the current suggestion within the same server session
    pub async fn revise(&mut self, prompt: &str) -> Result<StreamOutcome> {
        self.session.apply(SessionEvent::Revise)?;
        let session_id = self
            .session
            .session_id()
            .map(str::to_string)
            .unwrap_or_default();
        info!(session_id = %session_id, "requesting revision");

        let request = ReviseRequest {
            session_id,
            prompt: prompt.to_string(),
            provider: self.provider,
        };
        let (token, _in_flight) = self.cancel.begin();
        let opened = tokio::select! {
            _ = token.cancelled() => None,
            opened = self.api.open_revise(&request) => Some(opened),
        };
        let Some(opened) = opened else {
            return self.cancelled();
        };
        if opened.is_ok() {
            self.session.apply(SessionEvent::StreamOpened)?;
        }
        self.consume(opened, &token).await
    }

    /// Accept the current suggestion
    ///
    /// A rejected approval leaves the session `Ready` with the error
    /// recorded and is returned as `Err`.
    pub async fn approve(&mut self, target: ApproveTarget) -> Result<()> {
        let session_id = self.session.check_approve(&target)?.map(str::to_string);

        if let ApproveTarget::RemoteCommit {
            book_slug,
            chapter_slug,
        } = target
        {
            let request = ApproveRequest {
                session_id: session_id.unwrap_or_default(),
                book_slug,
                chapter_slug,
            };
            match self.api.approve(&request).await {
                Ok(response) => {
                    info!(status = %response.status, updated_at = %response.updated_at, "suggestion committed");
                }
                Err(err) if err.is_unauthorized() => return Err(self.unauthorized()),
                Err(err) => {
                    self.session.apply(SessionEvent::ApproveFailed {
                        message: err.to_string(),
                    })?;
                    return Err(err);
                }
            }
        }

        self.apply(SessionEvent::Approved)?;
        Ok(())
    }

    /// Drop the current suggestion; the server session simply expires
    pub fn discard(&mut self) -> Result<()> {
        self.apply(SessionEvent::Discard)
    }

    /// Abandon everything and return to idle. No-op when idle.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        // Cancel is accepted from every state
        let _ = self.apply(SessionEvent::Cancel);
    }

    /// Leave `Approved` for a new selection
    pub fn reset(&mut self) -> Result<()> {
        self.apply(SessionEvent::Reset)
    }

    fn apply(&mut self, event: SessionEvent) -> Result<()> {
        if let Some(notice) = self.session.apply(event)? {
            self.publish(notice);
        }
        Ok(())
    }

    fn publish(&self, notice: SessionNotice) {
        if let Some(observer) = &self.observer {
            // A dropped receiver just means nobody is listening anymore
            let _ = observer.send(notice);
        }
    }

    fn cancelled(&mut self) -> Result<StreamOutcome> {
        info!(state = ?self.session.state(), "stream cancelled");
        self.apply(SessionEvent::Cancel)?;
        Ok(StreamOutcome::Cancelled)
    }

    /// Authorization failures are fatal: reset the session and propagate
    fn unauthorized(&mut self) -> ClientError {
        warn!("credential rejected; session reset");
        let _ = self.apply(SessionEvent::Cancel);
        ClientError::Unauthorized
    }

    /// Feed the stream through the session until it ends
    ///
    /// After the terminal event only the trailing `session` event matters:
    /// a cancel or [`TRAILING_READ_GRACE`] of silence stops reading and the
    /// recorded outcome is returned with the session left `Ready`.
    async fn consume(
        &mut self,
        opened: Result<ByteStream>,
        token: &CancellationToken,
    ) -> Result<StreamOutcome> {
        let stream = match opened {
            Ok(stream) => stream,
            Err(err) if err.is_unauthorized() => return Err(self.unauthorized()),
            Err(err) => {
                let notice = self.session.apply(SessionEvent::TransportFailed {
                    message: err.to_string(),
                })?;
                return Ok(self.finish(notice));
            }
        };

        let mut events = StreamDecoder::new(stream);
        let mut outcome: Option<StreamOutcome> = None;

        loop {
            let next = tokio::select! {
                _ = token.cancelled() => {
                    if outcome.is_some() {
                        debug!("stopped reading after terminal event");
                        break;
                    }
                    return self.cancelled();
                }
                _ = tokio::time::sleep(TRAILING_READ_GRACE), if outcome.is_some() => {
                    debug!("no trailing events; closing stream");
                    break;
                }
                next = events.next() => next,
            };

            let event = match next {
                Some(Ok(wire)) => SessionEvent::Wire(wire),
                Some(Err(err)) => {
                    let err = ClientError::from(err);
                    if err.is_unauthorized() {
                        return Err(self.unauthorized());
                    }
                    SessionEvent::TransportFailed {
                        message: err.to_string(),
                    }
                }
                None => SessionEvent::StreamEnded,
            };
            let ended = matches!(
                event,
                SessionEvent::StreamEnded | SessionEvent::TransportFailed { .. }
            );

            if let Some(notice) = self.session.apply(event)? {
                if notice.is_terminal() && outcome.is_none() {
                    outcome = Some(outcome_of(&notice));
                }
                self.publish(notice);
            }
            if ended {
                break;
            }
        }

        if events.dropped_frames() > 0 {
            warn!(dropped = events.dropped_frames(), "skipped malformed frames");
        }
        // Every path into a stream end leaves a terminal notice behind
        Ok(outcome.unwrap_or(StreamOutcome::Failed {
            error: self.session.last_error().unwrap_or_default().to_string(),
            partial: self.session.accumulated_text().to_string(),
        }))
    }

    fn finish(&self, notice: Option<SessionNotice>) -> StreamOutcome {
        match notice {
            Some(notice) => {
                let outcome = outcome_of(&notice);
                self.publish(notice);
                outcome
            }
            None => StreamOutcome::Failed {
                error: self.session.last_error().unwrap_or_default().to_string(),
                partial: self.session.accumulated_text().to_string(),
            },
        }
    }
}

fn outcome_of(notice: &SessionNotice) -> StreamOutcome {
    match notice {
        SessionNotice::SuggestionComplete { text } => StreamOutcome::Completed { text: text.clone() },
        SessionNotice::StreamFailed { error, partial } => StreamOutcome::Failed {
            error: error.clone(),
            partial: partial.clone(),
        },
        _ => StreamOutcome::Cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_reports_in_flight_stream() {
        let handle = CancelHandle::default();
        assert!(!handle.cancel(), "nothing in flight yet");

        let (token, in_flight) = handle.begin();
        assert!(!token.is_cancelled(), "earlier cancel does not carry over");
        assert!(handle.is_in_flight());
        assert!(handle.clone().cancel());
        assert!(token.is_cancelled());

        drop(in_flight);
        assert!(!handle.is_in_flight());
        assert!(!handle.cancel());
    }
}
