//! Editable document buffer
//!
//! The editing surface side of a session: it owns the text, the selection
//! tracker and the saved copy used to detect unsaved edits. A completed
//! suggestion is merged right away; discarding it restores the text as it
//! was before the merge.

use tracing::debug;
use zenedit_core::{splice, splice_checked, LinkInserter, MergeError, Selection, SelectionTracker};

#[derive(Debug, Default)]
pub struct EditorBuffer {
    content: String,
    /// Stored copy; `None` when the text did not come from storage
    saved: Option<String>,
    tracker: SelectionTracker,
    /// Text before the pending suggestion was merged
    before_suggestion: Option<String>,
    /// Range holding the pending suggestion; revisions replace this range
    applied: Option<Selection>,
}

impl EditorBuffer {
    /// Buffer matching the stored copy (no unsaved edits)
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            saved: Some(content.clone()),
            content,
            ..Self::default()
        }
    }

    /// Buffer loaded from a local file: always counts as unsaved edits
    pub fn with_local_edits(content: impl Into<String>) -> Self {
        Self {
            saved: None,
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.saved.as_deref() != Some(self.content.as_str())
    }

    /// Content to send with a suggestion request: only when it differs from storage
    pub fn unsaved_content(&self) -> Option<String> {
        self.has_unsaved_changes().then(|| self.content.clone())
    }

    pub fn select(&mut self, from: usize, to: usize) -> Result<Option<Selection>, MergeError> {
        self.tracker.capture_range(&self.content, from, to)
    }

    pub fn select_all(&mut self) -> Option<Selection> {
        self.tracker.capture_all(&self.content)
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.tracker.current()
    }

    /// Whether a merged suggestion is waiting for approve or discard
    pub fn has_pending_suggestion(&self) -> bool {
        self.applied.is_some()
    }

    /// Merge a completed suggestion
    ///
    /// The first suggestion replaces the tracked selection, which must still
    /// hold the text it was captured with; a revision replaces the previous
    /// suggestion. Returns `false` when nothing is selected.
    pub fn apply_suggestion(&mut self, text: &str) -> Result<bool, MergeError> {
        let merged = match (&self.applied, self.tracker.current()) {
            (Some(applied), _) => splice(&self.content, applied, text)?,
            (None, Some(selection)) => splice_checked(&self.content, selection, text)?,
            (None, None) => return Ok(false),
        };
        if self.before_suggestion.is_none() {
            self.before_suggestion = Some(self.content.clone());
        }
        debug!(from = merged.applied.from(), to = merged.applied.to(), "merged suggestion");
        self.content = merged.buffer;
        self.applied = Some(merged.applied);
        Ok(true)
    }

    /// Keep the merged text; the selection is consumed
    pub fn accept_suggestion(&mut self) {
        self.before_suggestion = None;
        self.applied = None;
        self.tracker.clear();
    }

    /// Roll back to the text before the suggestion was merged
    pub fn discard_suggestion(&mut self) {
        if let Some(previous) = self.before_suggestion.take() {
            self.content = previous;
        }
        self.applied = None;
    }

    /// The current text is now what storage holds
    pub fn mark_saved(&mut self) {
        self.saved = Some(self.content.clone());
    }

    /// Insert image links in order after the first heading
    pub fn insert_links<'a, I>(&mut self, urls: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut inserter = LinkInserter::new(std::mem::take(&mut self.content));
        inserter.insert_all(urls);
        let inserted = inserter.inserted();
        self.content = inserter.finish();
        inserted
    }
}
