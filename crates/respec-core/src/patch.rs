//! Rewrite coordinator: anchored text edits against one immutable buffer.
//!
//! This module implements the edit infrastructure every conversion goes through:
//! - Insert-before / insert-after / replace edits anchored on byte ranges
//! - Overlap detection at submission time, rejecting only the offending edit
//! - Deterministic single-pass application (`Rewriter::process`)
//!
//! # Conflict Model
//!
//! Each edit *modifies* a region of the buffer:
//!
//! | Side | Modified region |
//! |------|-----------------|
//! | `Replace` | the anchor range itself |
//! | `Before` | zero-width point at `anchor.start` |
//! | `After` | zero-width point at `anchor.end` |
//!
//! Two edits conflict when their modified regions overlap. Touching ranges do
//! not conflict, two points never conflict, and a point conflicts with a
//! replacement only when it lies strictly inside it. A rejected edit leaves
//! every previously accepted edit in place.
//!
//! # Ordering at a Shared Point
//!
//! When several edits land on the same byte offset, the output order is:
//! 1. insert-after texts, innermost anchor first
//! 2. insert-before texts, outermost anchor first
//! 3. the replacement starting at that offset
//!
//! Edits with the same anchor and side keep their submission order.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

/// Hash type for content verification (SHA-256, stored as hex string for JSON compatibility).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
    /// Compute SHA-256 hash of the given bytes, returning hex-encoded string.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentHash(hex::encode(hasher.finalize()))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Span
// ============================================================================

/// Byte offsets into a source buffer.
///
/// Spans are half-open intervals: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    /// Start byte offset (inclusive).
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
}

impl Span {
    /// Create a new span.
    ///
    /// # Panics
    /// Panics if `start > end`.
    pub fn new(start: usize, end: usize) -> Self {
        assert!(
            start <= end,
            "Span start ({}) must be <= end ({})",
            start,
            end
        );
        Span { start, end }
    }

    /// A zero-width span at `offset`.
    pub fn point(offset: usize) -> Self {
        Span {
            start: offset,
            end: offset,
        }
    }

    /// Length of the span in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Check if span is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Check if this span overlaps with another.
    ///
    /// Two spans overlap if they share any byte positions.
    /// Adjacent spans (one ends where another starts) do NOT overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Check if this span contains another span entirely.
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

// ============================================================================
// Edits
// ============================================================================

/// Where an edit's text goes relative to its anchor range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditSide {
    /// Insert text immediately before the anchor.
    Before,
    /// Insert text immediately after the anchor.
    After,
    /// Replace the anchor's bytes with the text.
    Replace,
}

/// A single text change anchored on a byte range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    /// The anchor range in the original buffer.
    pub range: Span,
    /// The text to insert or substitute.
    pub text: String,
    /// How `text` relates to `range`.
    pub side: EditSide,
}

impl Edit {
    /// Create an insert-before edit.
    pub fn insert_before(range: Span, text: impl Into<String>) -> Self {
        Edit {
            range,
            text: text.into(),
            side: EditSide::Before,
        }
    }

    /// Create an insert-after edit.
    pub fn insert_after(range: Span, text: impl Into<String>) -> Self {
        Edit {
            range,
            text: text.into(),
            side: EditSide::After,
        }
    }

    /// Create a replace edit.
    pub fn replace(range: Span, text: impl Into<String>) -> Self {
        Edit {
            range,
            text: text.into(),
            side: EditSide::Replace,
        }
    }

    /// Create an edit that deletes `range`.
    pub fn remove(range: Span) -> Self {
        Edit::replace(range, "")
    }

    /// The region of the original buffer this edit actually modifies.
    pub fn modified_region(&self) -> Span {
        match self.side {
            EditSide::Before => Span::point(self.range.start),
            EditSide::After => Span::point(self.range.end),
            EditSide::Replace => self.range,
        }
    }

    /// Check whether this edit conflicts with another.
    pub fn conflicts_with(&self, other: &Edit) -> bool {
        regions_conflict(self.modified_region(), other.modified_region())
    }
}

fn regions_conflict(a: Span, b: Span) -> bool {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => false,
        (true, false) => b.start < a.start && a.start < b.end,
        (false, true) => a.start < b.start && b.start < a.end,
        (false, false) => a.overlaps(&b),
    }
}

/// Reasons an edit is rejected by the [`Rewriter`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewriteError {
    /// The edit overlaps an edit accepted earlier.
    #[error("edit at {rejected} overlaps previously accepted edit at {accepted}")]
    Overlap {
        /// Modified region of the edit that was already accepted.
        accepted: Span,
        /// Modified region of the rejected edit.
        rejected: Span,
    },

    /// The anchor range extends beyond the buffer.
    #[error("range {range} is out of bounds for buffer of length {len}")]
    OutOfBounds { range: Span, len: usize },

    /// The anchor range splits a multi-byte character.
    #[error("range {range} does not fall on character boundaries")]
    NotCharBoundary { range: Span },
}

impl RewriteError {
    /// Returns true for overlap rejections (as opposed to invalid ranges).
    pub fn is_overlap(&self) -> bool {
        matches!(self, RewriteError::Overlap { .. })
    }
}

/// Result type for rewrite operations.
pub type RewriteResult<T> = Result<T, RewriteError>;

// ============================================================================
// Rewriter
// ============================================================================

/// Accumulates edits against one immutable source buffer.
///
/// # Example
///
/// ```
/// use respec_core::patch::{Rewriter, Span};
///
/// let source = "foo.stub(:bar)";
/// let mut rewriter = Rewriter::new(source);
/// rewriter.replace(Span::new(0, 8), "allow(foo).to receive").unwrap();
/// assert_eq!(rewriter.process(), "allow(foo).to receive(:bar)");
/// ```
pub struct Rewriter<'src> {
    source: &'src str,
    edits: Vec<Edit>,
}

impl<'src> Rewriter<'src> {
    /// Create a rewriter with no edits.
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            edits: Vec::new(),
        }
    }

    /// The original buffer.
    pub fn source(&self) -> &'src str {
        self.source
    }

    /// Accepted edits, in submission order.
    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    /// Returns the number of accepted edits.
    pub fn len(&self) -> usize {
        self.edits.len()
    }

    /// Returns true if no edits have been accepted.
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Insert `text` immediately before `range`.
    pub fn insert_before(&mut self, range: Span, text: impl Into<String>) -> RewriteResult<()> {
        self.submit(Edit::insert_before(range, text))
    }

    /// Insert `text` immediately after `range`.
    pub fn insert_after(&mut self, range: Span, text: impl Into<String>) -> RewriteResult<()> {
        self.submit(Edit::insert_after(range, text))
    }

    /// Replace the bytes in `range` with `text`.
    pub fn replace(&mut self, range: Span, text: impl Into<String>) -> RewriteResult<()> {
        self.submit(Edit::replace(range, text))
    }

    /// Delete the bytes in `range`.
    pub fn remove(&mut self, range: Span) -> RewriteResult<()> {
        self.submit(Edit::remove(range))
    }

    /// Surround `range` with `before` and `after`; both insertions or neither.
    pub fn wrap(
        &mut self,
        range: Span,
        before: impl Into<String>,
        after: impl Into<String>,
    ) -> RewriteResult<()> {
        self.submit_all(vec![
            Edit::insert_before(range, before),
            Edit::insert_after(range, after),
        ])
    }

    /// Submit one edit.
    ///
    /// # Errors
    ///
    /// - `RewriteError::OutOfBounds` / `NotCharBoundary` for invalid anchors
    /// - `RewriteError::Overlap` if the edit conflicts with an accepted edit
    pub fn submit(&mut self, edit: Edit) -> RewriteResult<()> {
        self.check(&edit, &self.edits)?;
        self.edits.push(edit);
        Ok(())
    }

    /// Submit a group of edits atomically.
    ///
    /// Every edit is checked against the accepted set and against the earlier
    /// members of the group; the first failure rejects the whole group.
    pub fn submit_all(&mut self, edits: Vec<Edit>) -> RewriteResult<()> {
        let mut staged: Vec<Edit> = Vec::with_capacity(edits.len());
        for edit in edits {
            self.check(&edit, &self.edits)?;
            self.check(&edit, &staged)?;
            staged.push(edit);
        }
        self.edits.extend(staged);
        Ok(())
    }

    fn check(&self, edit: &Edit, against: &[Edit]) -> RewriteResult<()> {
        let range = edit.range;
        if range.end > self.source.len() {
            return Err(RewriteError::OutOfBounds {
                range,
                len: self.source.len(),
            });
        }
        if !self.source.is_char_boundary(range.start) || !self.source.is_char_boundary(range.end)
        {
            return Err(RewriteError::NotCharBoundary { range });
        }
        if let Some(existing) = against.iter().find(|e| e.conflicts_with(edit)) {
            debug!(
                accepted = %existing.modified_region(),
                rejected = %edit.modified_region(),
                "rejecting overlapping edit"
            );
            return Err(RewriteError::Overlap {
                accepted: existing.modified_region(),
                rejected: edit.modified_region(),
            });
        }
        Ok(())
    }

    /// Apply all accepted edits and return the resulting text.
    ///
    /// This is a pure function of the source and the accepted edit set; with
    /// no edits it returns the source byte for byte.
    pub fn process(&self) -> String {
        let mut order: Vec<(usize, &Edit)> = self.edits.iter().enumerate().collect();
        order.sort_by(|(seq_a, a), (seq_b, b)| {
            placement_key(a)
                .cmp(&placement_key(b))
                .then_with(|| seq_a.cmp(seq_b))
        });

        let extra: usize = self.edits.iter().map(|e| e.text.len()).sum();
        let mut out = String::with_capacity(self.source.len() + extra);
        let mut cursor = 0usize;

        for (_, edit) in order {
            let position = placement_position(edit);
            if position > cursor {
                out.push_str(&self.source[cursor..position]);
                cursor = position;
            }
            out.push_str(&edit.text);
            if edit.side == EditSide::Replace {
                cursor = cursor.max(edit.range.end);
            }
        }

        out.push_str(&self.source[cursor..]);
        out
    }
}

fn placement_position(edit: &Edit) -> usize {
    match edit.side {
        EditSide::Before | EditSide::Replace => edit.range.start,
        EditSide::After => edit.range.end,
    }
}

/// Sort key: position, then rank at that position, then nesting tiebreak.
fn placement_key(edit: &Edit) -> (usize, u8, isize) {
    let position = placement_position(edit);
    match edit.side {
        // Inner anchors (later start) close first.
        EditSide::After => (position, 0, -(edit.range.start as isize)),
        // Outer anchors (later end) open first.
        EditSide::Before => (position, 1, -(edit.range.end as isize)),
        EditSide::Replace => (position, 2, edit.range.end as isize),
    }
}

// ============================================================================
// Tests
// ============================================================================
