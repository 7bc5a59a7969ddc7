//! Selection snapshots
//!
//! A `Selection` records `(from, to, text)` at the moment the user asked for
//! a suggestion. Offsets count UTF-16 code units, which is what browser and
//! CodeMirror-style editors report, so every conversion to Rust byte indices
//! goes through [`utf16_to_byte`].

use serde::{Deserialize, Serialize};

use crate::merge::MergeError;

/// Immutable snapshot of a selected range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawSelection")]
pub struct Selection {
    from: usize,
    to: usize,
    text: String,
}

/// Wire shape; deserialized selections go through [`Selection::new`]
#[derive(Deserialize)]
struct RawSelection {
    from: usize,
    to: usize,
    text: String,
}

impl From<RawSelection> for Selection {
    fn from(raw: RawSelection) -> Self {
        Selection::new(raw.from, raw.to, raw.text)
    }
}

impl Selection {
    /// Build a snapshot; reversed offsets are normalised so `from <= to`
    pub fn new(from: usize, to: usize, text: impl Into<String>) -> Self {
        let (from, to) = if from <= to { (from, to) } else { (to, from) };
        Self {
            from,
            to,
            text: text.into(),
        }
    }

    /// Start offset (UTF-16 code units)
    pub fn from(&self) -> usize {
        self.from
    }

    /// End offset, exclusive (UTF-16 code units)
    pub fn to(&self) -> usize {
        self.to
    }

    /// Text that was selected when the snapshot was taken
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Width of the range in UTF-16 code units
    pub fn len(&self) -> usize {
        self.to.saturating_sub(self.from)
    }

    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }
}

/// Holds the latest selection snapshot
///
/// At most one selection is live; every capture replaces the previous one.
/// The tracker never reads or writes the document buffer on its own.
#[derive(Debug, Default)]
pub struct SelectionTracker {
    current: Option<Selection>,
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a selection change reported by the editing surface
    ///
    /// An empty `text` clears the tracked selection and returns `None`.
    pub fn capture(&mut self, from: usize, to: usize, text: &str) -> Option<Selection> {
        if text.is_empty() {
            self.current = None;
            return None;
        }
        let selection = Selection::new(from, to, text);
        self.current = Some(selection.clone());
        Some(selection)
    }

    /// Capture a range of `buffer`, deriving the selected text from it
    pub fn capture_range(
        &mut self,
        buffer: &str,
        from: usize,
        to: usize,
    ) -> Result<Option<Selection>, MergeError> {
        let (from, to) = if from <= to { (from, to) } else { (to, from) };
        let text = slice_utf16(buffer, from, to)?;
        Ok(self.capture(from, to, text))
    }

    /// Select the whole document
    pub fn capture_all(&mut self, buffer: &str) -> Option<Selection> {
        self.capture(0, utf16_len(buffer), buffer)
    }

    /// Latest snapshot, if any
    pub fn current(&self) -> Option<&Selection> {
        self.current.as_ref()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

/// Length of `s` in UTF-16 code units
pub fn utf16_len(s: &str) -> usize {
    s.chars().map(char::len_utf16).sum()
}

/// Convert a UTF-16 offset into a byte index of `s`
///
/// Returns `None` when the offset is past the end of `s` or falls between
/// the two halves of a surrogate pair.
pub fn utf16_to_byte(s: &str, offset: usize) -> Option<usize> {
    let mut units = 0;
    for (byte_idx, ch) in s.char_indices() {
        if units == offset {
            return Some(byte_idx);
        }
        units += ch.len_utf16();
        if units > offset {
            return None;
        }
    }
    (units == offset).then_some(s.len())
}

/// Slice `buffer` by UTF-16 offsets
pub(crate) fn slice_utf16(buffer: &str, from: usize, to: usize) -> Result<&str, MergeError> {
    let stale = || MergeError::StaleSelection {
        from,
        to,
        len: utf16_len(buffer),
    };
    if from > to {
        return Err(stale());
    }
    let start = utf16_to_byte(buffer, from).ok_or_else(stale)?;
    let end = utf16_to_byte(buffer, to).ok_or_else(stale)?;
    Ok(&buffer[start..end])
}
