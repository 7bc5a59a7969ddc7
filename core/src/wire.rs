//! Wire events
//!
//! One decoded unit of the agent event stream:
//!
//! ```text
//! event: delta     data: {"text": "..."}
//! event: done      data: {"replacement": "..."}
//! event: session   data: {"sessionId": "..."}
//! event: error     data: {"error": "..."}
//! ```

use serde::Deserialize;

/// Event names used on the wire
pub const DELTA: &str = "delta";
pub const DONE: &str = "done";
pub const SESSION: &str = "session";
pub const ERROR: &str = "error";

/// Typed wire event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    /// Incremental token chunk
    Delta { text: String },
    /// Final full replacement; supersedes any deltas already received
    Done { replacement: String },
    /// Server-side session id for later revise/approve calls
    SessionStarted { session_id: String },
    /// Server-reported failure; terminates the stream
    Error { message: String },
}

/// Frame body could not be turned into an event
#[derive(Debug, thiserror::Error)]
#[error("Malformed {event} frame: {source}")]
pub struct MalformedFrame {
    pub event: String,
    #[source]
    pub source: serde_json::Error,
}

#[derive(Deserialize)]
struct DeltaData {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct DoneData {
    replacement: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionData {
    session_id: String,
}

#[derive(Deserialize)]
struct ErrorData {
    #[serde(default)]
    error: Option<String>,
}

impl WireEvent {
    /// Decode one frame
    ///
    /// Unknown event names yield `Ok(None)`; a body that is not valid JSON or
    /// lacks a required field yields `Err(MalformedFrame)`.
    pub fn from_frame(event: &str, data: &str) -> Result<Option<WireEvent>, MalformedFrame> {
        let malformed = |source| MalformedFrame {
            event: event.to_string(),
            source,
        };
        let decoded = match event {
            DELTA => {
                let d: DeltaData = serde_json::from_str(data).map_err(malformed)?;
                WireEvent::Delta { text: d.text }
            }
            DONE => {
                let d: DoneData = serde_json::from_str(data).map_err(malformed)?;
                WireEvent::Done {
                    replacement: d.replacement,
                }
            }
            SESSION => {
                let d: SessionData = serde_json::from_str(data).map_err(malformed)?;
                WireEvent::SessionStarted {
                    session_id: d.session_id,
                }
            }
            ERROR => {
                let d: ErrorData = serde_json::from_str(data).map_err(malformed)?;
                WireEvent::Error {
                    message: d.error.unwrap_or_else(|| "Unknown error".to_string()),
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(decoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_each_event() {
        assert_eq!(
            WireEvent::from_frame("delta", r#"{"text":"He"}"#).unwrap(),
            Some(WireEvent::Delta {
                text: "He".to_string()
            })
        );
        assert_eq!(
            WireEvent::from_frame("done", r#"{"replacement":"Hello"}"#).unwrap(),
            Some(WireEvent::Done {
                replacement: "Hello".to_string()
            })
        );
        assert_eq!(
            WireEvent::from_frame("session", r#"{"sessionId":"s-1"}"#).unwrap(),
            Some(WireEvent::SessionStarted {
                session_id: "s-1".to_string()
            })
        );
        assert_eq!(
            WireEvent::from_frame("error", r#"{"error":"model overloaded"}"#).unwrap(),
            Some(WireEvent::Error {
                message: "model overloaded".to_string()
            })
        );
    }

    #[test]
    fn test_error_without_message() {
        let event = WireEvent::from_frame("error", "{}").unwrap().unwrap();
        assert_eq!(
            event,
            WireEvent::Error {
                message: "Unknown error".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_event_ignored() {
        assert!(WireEvent::from_frame("ping", "{}").unwrap().is_none());
    }

    #[test]
    fn test_malformed_frames() {
        assert!(WireEvent::from_frame("delta", "{not json").is_err());
        assert!(WireEvent::from_frame("done", r#"{"text":"x"}"#).is_err());
        assert!(WireEvent::from_frame("session", r#"{"session_id":"x"}"#).is_err());
    }
}
