//! Content merging
//!
//! Splices a generated replacement into a document buffer using a selection
//! snapshot. The buffer may have changed since the snapshot was taken, so
//! offsets are re-validated on every call and a violation is reported as
//! [`MergeError::StaleSelection`] instead of producing corrupted text.
//!
//! All functions here are pure: nothing is retained between calls, so a
//! merge can run eagerly when a stream completes or later on approval.

use crate::selection::{slice_utf16, utf16_len, utf16_to_byte, Selection};

/// Merge failures
///
/// Both variants are recoverable: the caller re-captures the selection
/// against the current buffer and merges again.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    /// Offsets no longer fit the buffer (it shrank, or an offset splits a character)
    #[error("Stale selection {from}..{to} for buffer of {len} UTF-16 units")]
    StaleSelection { from: usize, to: usize, len: usize },

    /// Offsets fit, but the text under them is not what was selected
    #[error("Selected text changed since snapshot at {from}..{to}")]
    ContentChanged { from: usize, to: usize },
}

impl MergeError {
    /// Whether the caller must capture a fresh selection before retrying
    pub fn requires_reselection(&self) -> bool {
        matches!(
            self,
            MergeError::StaleSelection { .. } | MergeError::ContentChanged { .. }
        )
    }
}

/// Result of a splice: the new buffer and the range now holding the replacement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Splice {
    pub buffer: String,
    /// Covers the inserted replacement; use it to splice a later revision
    pub applied: Selection,
}

/// `buffer[..from] + replacement + buffer[to..]`, offsets in UTF-16 units
pub fn apply(buffer: &str, selection: &Selection, replacement: &str) -> Result<String, MergeError> {
    splice(buffer, selection, replacement).map(|s| s.buffer)
}

/// Like [`splice`], but the current text under the range must still equal
/// the snapshot text
pub fn splice_checked(
    buffer: &str,
    selection: &Selection,
    replacement: &str,
) -> Result<Splice, MergeError> {
    let current = slice_utf16(buffer, selection.from(), selection.to())?;
    if current != selection.text() {
        return Err(MergeError::ContentChanged {
            from: selection.from(),
            to: selection.to(),
        });
    }
    splice(buffer, selection, replacement)
}

/// Splice `replacement` into `buffer` and report where it landed
pub fn splice(buffer: &str, selection: &Selection, replacement: &str) -> Result<Splice, MergeError> {
    let (from, to) = (selection.from(), selection.to());
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

    let mut merged = String::with_capacity(buffer.len() - (end - start) + replacement.len());
    merged.push_str(&buffer[..start]);
    merged.push_str(replacement);
    merged.push_str(&buffer[end..]);

    tracing::debug!(from, to, inserted = replacement.len(), "spliced replacement");

    Ok(Splice {
        buffer: merged,
        applied: Selection::new(from, from + utf16_len(replacement), replacement),
    })
}

/// Where the next link block goes
#[derive(Debug, Clone, Copy)]
enum Placement {
    /// Byte index just past the first heading line; blocks are `\n`-prefixed lines
    AfterHeading(usize),
    /// Byte index near the top of a document with no heading; `\n`-suffixed lines
    Top(usize),
}

/// Ordered insertion of resource links
///
/// Links go right after the first markdown heading (or at the top when the
/// document has none). Each insertion is computed against the buffer as
/// amended by the previous ones, so links keep the caller's order no matter
/// how long each upload took. Apply them one at a time, never concurrently.
#[derive(Debug, Clone)]
pub struct LinkInserter {
    buffer: String,
    placement: Placement,
    inserted: usize,
}

impl LinkInserter {
    pub fn new(buffer: impl Into<String>) -> Self {
        let buffer = buffer.into();
        let mut line_start = 0;
        let mut placement = Placement::Top(0);
        for line in buffer.split('\n') {
            if line.trim().starts_with('#') {
                placement = Placement::AfterHeading(line_start + line.len());
                break;
            }
            line_start += line.len() + 1;
        }
        Self {
            buffer,
            placement,
            inserted: 0,
        }
    }

    /// Insert one markdown image link as its own paragraph
    pub fn insert(&mut self, url: &str) -> &mut Self {
        let link = format!("![]({})", url);
        let lines = ["", link.as_str(), ""];
        let (at, block): (usize, String) = match self.placement {
            Placement::AfterHeading(at) => (at, lines.iter().map(|l| format!("\n{}", l)).collect()),
            Placement::Top(at) => (at, lines.iter().map(|l| format!("{}\n", l)).collect()),
        };
        self.buffer.insert_str(at, &block);
        self.placement = match self.placement {
            Placement::AfterHeading(_) => Placement::AfterHeading(at + block.len()),
            Placement::Top(_) => Placement::Top(at + block.len()),
        };
        self.inserted += 1;
        self
    }

    /// Insert every link in order
    pub fn insert_all<'a, I>(&mut self, urls: I) -> &mut Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        for url in urls {
            self.insert(url);
        }
        self
    }

    /// Number of links inserted so far
    pub fn inserted(&self) -> usize {
        self.inserted
    }

    pub fn finish(self) -> String {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sel(from: usize, to: usize, text: &str) -> Selection {
        Selection::new(from, to, text)
    }

    #[test]
    fn test_apply_replaces_body() {
        let merged = apply("# Title\nbody", &sel(8, 12, "body"), "BODY").unwrap();
        assert_eq!(merged, "# Title\nBODY");
    }

    #[test]
    fn test_apply_past_end_is_stale() {
        let err = apply("# Title\nbody", &sel(9, 13, "ody"), "BODY").unwrap_err();
        assert_eq!(
            err,
            MergeError::StaleSelection {
                from: 9,
                to: 13,
                len: 12
            }
        );
        assert!(err.requires_reselection());
    }

    #[test]
    fn test_empty_replacement_removes_range() {
        let buffer = "abcdefgh";
        for from in 0..=buffer.len() {
            for to in from..=buffer.len() {
                let merged = apply(buffer, &sel(from, to, ""), "").unwrap();
                let expected = format!("{}{}", &buffer[..from], &buffer[to..]);
                assert_eq!(merged, expected, "range {}..{}", from, to);
            }
        }
    }

    #[test]
    fn test_apply_utf16_offsets() {
        // "😀" is two UTF-16 units
        let buffer = "😀 hi there";
        let merged = apply(buffer, &sel(3, 5, "hi"), "hello").unwrap();
        assert_eq!(merged, "😀 hello there");
    }

    #[test]
    fn test_apply_inside_surrogate_pair_is_stale() {
        let err = apply("a😀b", &sel(2, 3, ""), "x").unwrap_err();
        assert!(matches!(err, MergeError::StaleSelection { .. }));
    }

    #[test]
    fn test_splice_checked_detects_drift() {
        let selection = sel(0, 5, "hello");
        assert_eq!(
            splice_checked("hello world", &selection, "bye").unwrap().buffer,
            "bye world"
        );
        let err = splice_checked("HELLO world", &selection, "bye").unwrap_err();
        assert_eq!(err, MergeError::ContentChanged { from: 0, to: 5 });
    }

    #[test]
    fn test_deserialized_reversed_selection_splices() {
        let selection: Selection = serde_json::from_str(r#"{"from":5,"to":2,"text":"x"}"#).unwrap();
        assert_eq!(apply("abcdefgh", &selection, "X").unwrap(), "abXfgh");

        let far: Selection = serde_json::from_str(r#"{"from":40,"to":20,"text":"x"}"#).unwrap();
        assert!(matches!(
            apply("abcdefgh", &far, "X"),
            Err(MergeError::StaleSelection { from: 20, to: 40, len: 8 })
        ));
    }

    #[test]
    fn test_splice_reports_applied_range() {
        let out = splice("one two three", &sel(4, 7, "two"), "2️⃣").unwrap();
        assert_eq!(out.buffer, "one 2️⃣ three");
        assert_eq!(out.applied.from(), 4);
        assert_eq!(out.applied.to(), 4 + utf16_len("2️⃣"));

        // A revision replaces the previous suggestion, not the original range
        let again = splice(&out.buffer, &out.applied, "TWO").unwrap();
        assert_eq!(again.buffer, "one TWO three");
    }

    #[test]
    fn test_links_after_first_heading_keep_order() {
        let mut inserter = LinkInserter::new("intro\n# Title\nbody");
        inserter.insert_all(["a.png", "b.png"]);
        assert_eq!(inserter.inserted(), 2);
        assert_eq!(
            inserter.finish(),
            "intro\n# Title\n\n![](a.png)\n\n\n![](b.png)\n\nbody"
        );
    }

    #[test]
    fn test_links_without_heading_go_to_top() {
        let mut inserter = LinkInserter::new("body");
        inserter.insert("a.png").insert("b.png");
        assert_eq!(inserter.finish(), "\n![](a.png)\n\n\n![](b.png)\n\nbody");
    }

    #[test]
    fn test_link_after_trailing_heading() {
        let mut inserter = LinkInserter::new("# Title");
        inserter.insert("a.png");
        assert_eq!(inserter.finish(), "# Title\n\n![](a.png)\n");
    }
}
