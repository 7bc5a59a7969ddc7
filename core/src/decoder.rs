//! Stream decoder
//!
//! Turns the raw bytes of an agent response into [`WireEvent`]s.
//!
//! Framing rules:
//! - Bytes are buffered until a full line (`\n` or `\r\n`) is available, so
//!   multi-byte UTF-8 characters split across chunks survive intact
//! - `event:` sets the name of the current block, `data:` lines accumulate
//! - A blank line after at least one `data:` line completes the block
//! - The event name resets after every completed block, so stray `data:`
//!   lines with no `event:` before them are ignored
//! - Malformed JSON drops that one block; decoding continues
//! - End of input ends the sequence, no terminal event is synthesized

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tracing::debug;

use crate::wire::WireEvent;

/// Push-based frame decoder
///
/// Feed it chunks as they arrive; it returns every event completed by the
/// chunk. Usable without an async runtime.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    event: String,
    data: Vec<String>,
    dropped: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one transport chunk
    pub fn push(&mut self, chunk: &[u8]) -> Vec<WireEvent> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(line) = self.take_line() {
            if let Some(event) = self.feed_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Signal end of input
    ///
    /// A block that only lacks its closing blank line is still dispatched.
    /// An unterminated trailing line is discarded.
    pub fn finish(&mut self) -> Option<WireEvent> {
        if !self.pending.is_empty() {
            debug!(bytes = self.pending.len(), "discarding unterminated line at end of stream");
            self.pending.clear();
        }
        if self.data.is_empty() {
            self.event.clear();
            return None;
        }
        self.dispatch()
    }

    /// Blocks dropped because their body did not decode
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    fn take_line(&mut self) -> Option<String> {
        let newline = self.pending.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=newline).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    fn feed_line(&mut self, line: &str) -> Option<WireEvent> {
        if line.is_empty() {
            if self.data.is_empty() {
                // Block without data: nothing to dispatch
                self.event.clear();
                return None;
            }
            return self.dispatch();
        }

        if let Some(name) = field(line, "event") {
            self.event = name.to_string();
        } else if let Some(data) = field(line, "data") {
            self.data.push(data.to_string());
        }
        // Comments (`:`) and other fields (`id:`, `retry:`) carry nothing we use
        None
    }

    fn dispatch(&mut self) -> Option<WireEvent> {
        let event = std::mem::take(&mut self.event);
        let data = self.data.join("\n");
        self.data.clear();

        if event.is_empty() {
            debug!("ignoring data block without event name");
            return None;
        }

        match WireEvent::from_frame(&event, &data) {
            Ok(Some(decoded)) => Some(decoded),
            Ok(None) => {
                debug!(event = %event, "ignoring unknown event");
                None
            }
            Err(err) => {
                self.dropped += 1;
                debug!(error = %err, "dropping malformed frame");
                None
            }
        }
    }
}

/// `name: value` with one optional space after the colon
fn field<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(name)?.strip_prefix(':')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Stream adapter from transport bytes to wire events
///
/// Transport errors are passed through as `Err` items and end the sequence.
/// The sequence is lazy, finite and cannot be restarted.
pub struct StreamDecoder<S> {
    inner: S,
    decoder: FrameDecoder,
    ready: VecDeque<WireEvent>,
    done: bool,
}

impl<S> StreamDecoder<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::new(),
            ready: VecDeque::new(),
            done: false,
        }
    }

    /// Blocks dropped so far because their body did not decode
    pub fn dropped_frames(&self) -> usize {
        self.decoder.dropped()
    }
}

impl<S, E> Stream for StreamDecoder<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<WireEvent, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(event) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if this.done {
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    this.ready.extend(this.decoder.push(&chunk));
                }
                Poll::Ready(Some(Err(err))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    this.done = true;
                    this.ready.extend(this.decoder.finish());
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
