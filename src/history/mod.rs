//! Clipboard history model
//!
//! This module holds the in-memory history: a most-recent-first list of
//! captured entries, bounded by a configurable capacity, with text
//! deduplication and MRU promotion. It performs no I/O; persistence lives
//! in [`crate::store`].

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Immutable view of the history handed to change subscribers.
///
/// Subscribers share the snapshot; they never mutate it.
pub type HistorySnapshot = Arc<Vec<Entry>>;

/// Kind of clipboard capture an entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Text,
    Image,
}

/// One clipboard capture.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Whether this is a text or image capture.
    pub kind: EntryKind,
    /// Text content; present iff `kind` is [`EntryKind::Text`].
    pub content: Option<String>,
    /// PNG-encoded image bytes; present iff `kind` is [`EntryKind::Image`].
    ///
    /// May be empty once released (eviction, clear) or when the backing
    /// file could not be read on load; `image_path` is then the
    /// authoritative reference.
    pub payload: Bytes,
    /// On-disk location of the externalized image, set on first persist
    /// and stable thereafter.
    pub image_path: Option<PathBuf>,
    /// Capture time in milliseconds, unique per entry. Also used as the
    /// filename stem of the externalized image.
    pub timestamp: i64,
}

impl Entry {
    /// Create a text entry.
    pub fn text(content: impl Into<String>, timestamp: i64) -> Self {
        Self {
            kind: EntryKind::Text,
            content: Some(content.into()),
            payload: Bytes::new(),
            image_path: None,
            timestamp,
        }
    }

    /// Create an image entry from PNG-encoded bytes.
    pub fn image(payload: Bytes, timestamp: i64) -> Self {
        Self {
            kind: EntryKind::Image,
            content: None,
            payload,
            image_path: None,
            timestamp,
        }
    }

    /// Check if this is a text entry.
    pub fn is_text(&self) -> bool {
        self.kind == EntryKind::Text
    }

    /// Check if this is an image entry.
    pub fn is_image(&self) -> bool {
        self.kind == EntryKind::Image
    }

    /// True for text entries whose content equals `text`.
    pub fn matches_text(&self, text: &str) -> bool {
        self.is_text() && self.content.as_deref() == Some(text)
    }

    /// Drop the in-memory image bytes. The on-disk file, if any, is left
    /// for the next reconciliation pass.
    pub fn release_payload(&mut self) {
        if self.is_image() {
            self.payload = Bytes::new();
        }
    }
}

/// Bounded, most-recent-first list of clipboard entries.
#[derive(Debug)]
pub struct History {
    entries: Vec<Entry>,
    max_size: usize,
    last_timestamp: i64,
}

impl History {
    /// Create an empty history with the given capacity (clamped to >= 1).
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_size: max_size.max(1),
            last_timestamp: 0,
        }
    }

    /// Rebuild a history from persisted entries, most recent first.
    /// Trims immediately if `entries` exceeds the capacity.
    pub fn from_entries(entries: Vec<Entry>, max_size: usize) -> Self {
        let last_timestamp = entries.iter().map(|e| e.timestamp).max().unwrap_or(0);
        let mut history = Self {
            entries,
            max_size: max_size.max(1),
            last_timestamp,
        };
        history.trim();
        history
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// The most recent entry, if any.
    pub fn head(&self) -> Option<&Entry> {
        self.entries.first()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Mutable iteration for the persistence layer, which records the
    /// externalized image path on each entry in place.
    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut Entry> {
        self.entries.iter_mut()
    }

    /// Shareable copy of the current entries for change subscribers.
    /// Image payloads are reference-counted, so this is cheap.
    pub fn snapshot(&self) -> HistorySnapshot {
        Arc::new(self.entries.clone())
    }

    /// Issue a capture timestamp, strictly greater than any issued or
    /// loaded before it so image filename stems never collide.
    pub fn fresh_timestamp(&mut self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        self.last_timestamp = now.max(self.last_timestamp + 1);
        self.last_timestamp
    }

    /// Insert captured text at the front.
    ///
    /// Empty or whitespace-only text is rejected. Text equal to the
    /// current head is a no-op (already at the front). Otherwise any
    /// older entry with the same content is removed and a single fresh
    /// copy lands at index 0.
    ///
    /// Returns `true` if the history changed.
    pub fn push_text(&mut self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        if self.head().is_some_and(|head| head.matches_text(text)) {
            return false;
        }

        self.entries.retain(|e| !e.matches_text(text));
        let timestamp = self.fresh_timestamp();
        self.entries.insert(0, Entry::text(text, timestamp));
        self.trim();
        true
    }

    /// Insert a captured image at the front.
    ///
    /// Zero-length payloads are rejected. Duplicate detection compares
    /// against the head only, byte for byte (no hash shortcut).
    ///
    /// Returns `true` if the history changed.
    pub fn push_image(&mut self, payload: Bytes) -> bool {
        if payload.is_empty() {
            return false;
        }
        if self
            .head()
            .is_some_and(|head| head.is_image() && head.payload == payload)
        {
            return false;
        }

        let timestamp = self.fresh_timestamp();
        self.entries.insert(0, Entry::image(payload, timestamp));
        self.trim();
        true
    }

    /// Promote the entry at `index` to the front, preserving the relative
    /// order of all other entries. The entry keeps its timestamp.
    ///
    /// Returns the promoted entry, or `None` if `index` is out of range.
    pub fn select(&mut self, index: usize) -> Option<&Entry> {
        if index >= self.entries.len() {
            return None;
        }
        let entry = self.entries.remove(index);
        self.entries.insert(0, entry);
        self.head()
    }

    /// Release all image payloads and empty the list. Disk cleanup is
    /// deferred to the next reconciliation pass.
    pub fn clear(&mut self) {
        for entry in &mut self.entries {
            entry.release_payload();
        }
        self.entries.clear();
    }

    /// Update the capacity (clamped to >= 1), trimming immediately if the
    /// new bound is smaller.
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size.max(1);
        self.trim();
    }

    /// Drop entries beyond the capacity, releasing their image bytes.
    fn trim(&mut self) {
        while self.entries.len() > self.max_size {
            if let Some(mut evicted) = self.entries.pop() {
                evicted.release_payload();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn text_contents(history: &History) -> Vec<&str> {
        history
            .entries()
            .iter()
            .filter_map(|e| e.content.as_deref())
            .collect()
    }

    #[test]
    fn push_text_inserts_at_front() {
        let mut history = History::new(10);
        assert!(history.push_text("first"));
        assert!(history.push_text("second"));
        assert_eq!(text_contents(&history), vec!["second", "first"]);
    }

    #[test]
    fn push_text_rejects_whitespace() {
        let mut history = History::new(10);
        assert!(!history.push_text(""));
        assert!(!history.push_text("   \n\t"));
        assert!(history.is_empty());
    }

    #[test]
    fn duplicate_of_head_is_noop() {
        let mut history = History::new(10);
        history.push_text("x");
        let head_timestamp = history.head().unwrap().timestamp;

        assert!(!history.push_text("x"));
        assert_eq!(history.len(), 1);
        assert_eq!(history.head().unwrap().timestamp, head_timestamp);
    }

    #[test]
    fn duplicate_of_older_entry_is_promoted_fresh() {
        let mut history = History::new(10);
        history.push_text("a");
        history.push_text("b");
        history.push_text("c");
        let old_timestamp = history.entries()[2].timestamp;

        assert!(history.push_text("a"));
        assert_eq!(text_contents(&history), vec!["a", "c", "b"]);
        assert!(history.head().unwrap().timestamp > old_timestamp);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut history = History::new(3);
        for text in ["a", "b", "c", "d"] {
            history.push_text(text);
        }
        assert_eq!(text_contents(&history), vec!["d", "c", "b"]);
    }

    #[test]
    fn eviction_releases_image_payload() {
        let mut history = History::new(1);
        history.push_image(Bytes::from_static(b"png-one"));
        let first = history.head().unwrap().clone();
        assert!(!first.payload.is_empty());

        history.push_image(Bytes::from_static(b"png-two"));
        assert_eq!(history.len(), 1);
        assert_eq!(history.head().unwrap().payload.as_ref(), b"png-two");
    }

    #[test]
    fn image_duplicate_checks_head_only() {
        let payload = Bytes::from_static(b"\x89PNG fake");
        let mut history = History::new(10);
        assert!(history.push_image(payload.clone()));
        assert!(!history.push_image(payload.clone()));
        assert_eq!(history.len(), 1);

        history.push_text("between");
        // Same bytes again, but head is now text: captured as a new entry.
        assert!(history.push_image(payload));
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn select_rotates_to_front() {
        let mut history = History::new(10);
        history.push_text("c");
        history.push_text("b");
        history.push_text("a");
        // history = [a, b, c]
        assert!(history.select(2).is_some());
        assert_eq!(text_contents(&history), vec!["c", "a", "b"]);
    }

    #[test]
    fn select_keeps_timestamp() {
        let mut history = History::new(10);
        history.push_text("old");
        history.push_text("new");
        let old_timestamp = history.entries()[1].timestamp;

        history.select(1);
        assert_eq!(history.head().unwrap().timestamp, old_timestamp);
    }

    #[test]
    fn select_out_of_range_is_noop() {
        let mut history = History::new(10);
        history.push_text("only");
        assert!(history.select(5).is_none());
        assert_eq!(text_contents(&history), vec!["only"]);
    }

    #[test]
    fn clear_empties_and_releases() {
        let mut history = History::new(10);
        history.push_text("a");
        history.push_image(Bytes::from_static(b"img"));
        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn shrinking_max_size_trims() {
        let mut history = History::new(5);
        for text in ["a", "b", "c", "d", "e"] {
            history.push_text(text);
        }
        history.set_max_size(2);
        assert_eq!(text_contents(&history), vec!["e", "d"]);
    }

    #[test]
    fn max_size_clamped_to_one() {
        let mut history = History::new(0);
        assert_eq!(history.max_size(), 1);
        history.push_text("a");
        history.push_text("b");
        assert_eq!(text_contents(&history), vec!["b"]);
    }

    #[test]
    fn timestamps_strictly_increase() {
        let mut history = History::new(10);
        let a = history.fresh_timestamp();
        let b = history.fresh_timestamp();
        let c = history.fresh_timestamp();
        assert!(a < b && b < c);
    }

    #[test]
    fn from_entries_trims_and_continues_timestamps() {
        let entries = vec![
            Entry::text("new", 2_000),
            Entry::text("mid", 1_500),
            Entry::text("old", 1_000),
        ];
        let mut history = History::from_entries(entries, 2);
        assert_eq!(text_contents(&history), vec!["new", "mid"]);
        assert!(history.fresh_timestamp() > 2_000);
    }

    proptest! {
        #[test]
        fn no_duplicate_text_contents(texts in proptest::collection::vec("[a-f]{1,3}", 0..40)) {
            let mut history = History::new(8);
            for text in &texts {
                history.push_text(text);
            }
            let mut seen = text_contents(&history);
            seen.sort_unstable();
            let before = seen.len();
            seen.dedup();
            prop_assert_eq!(before, seen.len());
        }

        #[test]
        fn length_never_exceeds_capacity(
            texts in proptest::collection::vec("[a-z]{1,6}", 0..60),
            max_size in 1usize..10,
        ) {
            let mut history = History::new(max_size);
            for text in &texts {
                history.push_text(text);
                prop_assert!(history.len() <= max_size);
            }
        }

        #[test]
        fn select_preserves_relative_order(index in 0usize..8) {
            let mut history = History::new(10);
            for i in (0..8).rev() {
                history.push_text(format!("item-{i}").as_str());
            }
            let before: Vec<String> =
                text_contents(&history).iter().map(|s| s.to_string()).collect();

            history.select(index);

            let mut expected = before.clone();
            let chosen = expected.remove(index);
            expected.insert(0, chosen);
            let after: Vec<String> =
                text_contents(&history).iter().map(|s| s.to_string()).collect();
            prop_assert_eq!(after, expected);
        }
    }
}
