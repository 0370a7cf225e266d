//! Wire-facing data types shared by the engine and its host.
//!
//! All types in this module are fully owned (no borrowed lifetimes) and
//! implement `Send` so they can cross task boundaries freely: batches arrive
//! from the host's transport layer, travel through per-resource queues, and
//! are retained in applied-edit logs without arena allocation.

use serde::{Deserialize, Serialize};

/// A zero-based position inside a text buffer.
///
/// `col` counts UTF-16 code units from the start of the line, matching the
/// addressing used by the agent protocol. A position whose column lands in
/// the middle of a surrogate pair is invalid and rejected at edit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    /// Zero-based line index.
    pub line: u32,
    /// Zero-based column, in UTF-16 code units.
    pub col: u32,
}

impl Position {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

/// A half-open range `[start, end)` inside a text buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    /// Inclusive start position.
    pub start: Position,
    /// Exclusive end position.
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// A collapsed range (pure insertion point) at `pos`.
    pub fn caret(pos: Position) -> Self {
        Self { start: pos, end: pos }
    }

    /// True when the range selects no text (insertion point).
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True when `end` precedes `start` — such ranges are never applied.
    pub fn is_reversed(&self) -> bool {
        self.end < self.start
    }
}

/// A single replacement produced by the agent.
///
/// Immutable once constructed; consumed exactly once by the owning
/// resource's queue. The text selected by `range` is replaced by `new_text`
/// (which may be empty — a deletion — or contain newlines).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    /// The half-open range to replace.
    pub range: Range,
    /// Replacement text. `\n` separates lines; no `\r` handling is performed.
    pub new_text: String,
}

impl TextEdit {
    pub fn new(range: Range, new_text: impl Into<String>) -> Self {
        Self { range, new_text: new_text.into() }
    }

    /// Convenience constructor from bare coordinates.
    pub fn replace(
        start_line: u32,
        start_col: u32,
        end_line: u32,
        end_col: u32,
        new_text: impl Into<String>,
    ) -> Self {
        Self::new(
            Range::new(Position::new(start_line, start_col), Position::new(end_line, end_col)),
            new_text,
        )
    }
}

/// One ordered group of edits delivered together for a single resource.
///
/// The sole mutation input of the engine. Edits are applied in the order
/// given, each against the text produced by its predecessors in the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEditBatch {
    /// Session the batch belongs to.
    pub session_id: String,
    /// Agent turn the batch belongs to. First-seen order of iteration ids
    /// defines the session-wide iteration order.
    pub iteration_id: String,
    /// Resource URI the edits target.
    pub resource: String,
    /// The edits, in application order.
    pub edits: Vec<TextEdit>,
}

/// A half-open span of whole lines `[start, end)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    /// Zero-based first line of the span.
    pub start: u32,
    /// Zero-based line one past the last line of the span.
    pub end: u32,
}

impl LineRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Smallest span covering both `self` and `other`.
    pub fn union(&self, other: LineRange) -> LineRange {
        if other.is_empty() {
            return *self;
        }
        if self.is_empty() {
            return other;
        }
        LineRange { start: self.start.min(other.start), end: self.end.max(other.end) }
    }
}

/// Aggregate line counts for a review summary.
///
/// Accounting is asymmetric on purpose: a pure insertion contributes only to
/// `lines_added` (counted by new-range length), a pure deletion only to
/// `lines_removed` (old-range length), and a replacement to both. Review
/// summaries render these numbers directly, so they must be exact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffStat {
    /// Lines present in the working buffer but not in the original.
    pub lines_added: usize,
    /// Lines present in the original but not in the working buffer.
    pub lines_removed: usize,
}

/// Per-resource review classification.
///
/// `Modified` is derived from the presence of applied edits; `Accepted` and
/// `Rejected` are terminal until the owning session is disposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewState {
    /// The working buffer differs from the original and awaits a decision.
    Modified,
    /// The user kept the working content; the original snapshot is gone.
    Accepted,
    /// The user restored the original content.
    Rejected,
}
