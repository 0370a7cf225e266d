//! Line-level diffing between two buffer snapshots.
//!
//! [`compute_diff`] is a pure function over two [`ImmutableText`] values —
//! no shared state, safe to call concurrently for different buffer pairs.
//! The engine recomputes it after every applied batch to keep the review
//! surface (per-file diff stat and region list) current.

use similar::{DiffOp, TextDiff};

use crate::buffer::ImmutableText;
use crate::types::{DiffStat, LineRange};

/// Classification of one diff region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    /// Lines present only in the new text.
    Added,
    /// Lines present only in the old text.
    Removed,
    /// Lines common to both texts.
    Unchanged,
}

/// One contiguous run of lines with a single classification.
///
/// For `Added` regions `old_lines` is empty (an anchor point); for `Removed`
/// regions `new_lines` is empty. A replacement appears as a `Removed` region
/// immediately followed by an `Added` region at the same anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffRegion {
    pub kind: DiffKind,
    /// Span in the old text, half-open.
    pub old_lines: LineRange,
    /// Span in the new text, half-open.
    pub new_lines: LineRange,
}

/// Ordered region list plus aggregate counts for one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineDiff {
    /// Regions in text order, covering both inputs completely.
    pub regions: Vec<DiffRegion>,
    /// Aggregate counts driving the review summary.
    pub stat: DiffStat,
}

impl LineDiff {
    /// True when the two inputs were identical.
    pub fn is_identity(&self) -> bool {
        self.stat.lines_added == 0 && self.stat.lines_removed == 0
    }
}

/// Computes the line diff from `old` to `new`.
///
/// Accounting is asymmetric and must stay bit-exact for the review summary:
/// a pure insertion counts only `lines_added` (by new-range length), a pure
/// deletion only `lines_removed` (old-range length), and a replacement both.
/// `compute_diff(x, x)` always reports zero counts.
pub fn compute_diff(old: &ImmutableText, new: &ImmutableText) -> LineDiff {
    let old_text = canonical(old);
    let new_text = canonical(new);
    let diff = TextDiff::from_lines(&old_text, &new_text);

    let mut regions = Vec::new();
    let mut stat = DiffStat::default();

    for op in diff.ops() {
        let old_range = LineRange::new(op.old_range().start as u32, op.old_range().end as u32);
        let new_range = LineRange::new(op.new_range().start as u32, op.new_range().end as u32);
        match op {
            DiffOp::Equal { .. } => {
                regions.push(DiffRegion {
                    kind: DiffKind::Unchanged,
                    old_lines: old_range,
                    new_lines: new_range,
                });
            }
            DiffOp::Delete { .. } => {
                stat.lines_removed += old_range.len() as usize;
                regions.push(DiffRegion {
                    kind: DiffKind::Removed,
                    old_lines: old_range,
                    new_lines: LineRange::new(new_range.start, new_range.start),
                });
            }
            DiffOp::Insert { .. } => {
                stat.lines_added += new_range.len() as usize;
                regions.push(DiffRegion {
                    kind: DiffKind::Added,
                    old_lines: LineRange::new(old_range.start, old_range.start),
                    new_lines: new_range,
                });
            }
            DiffOp::Replace { .. } => {
                stat.lines_removed += old_range.len() as usize;
                stat.lines_added += new_range.len() as usize;
                regions.push(DiffRegion {
                    kind: DiffKind::Removed,
                    old_lines: old_range,
                    new_lines: LineRange::new(new_range.start, new_range.start),
                });
                regions.push(DiffRegion {
                    kind: DiffKind::Added,
                    old_lines: LineRange::new(old_range.end, old_range.end),
                    new_lines: new_range,
                });
            }
        }
    }

    LineDiff { regions, stat }
}

/// Renders a snapshot with every line newline-terminated so the tokenizer
/// never distinguishes a final line by its missing terminator. An empty
/// document renders as the empty string (zero line tokens), so creating a
/// new file counts as pure insertion.
fn canonical(text: &ImmutableText) -> String {
    if text.line_count() == 1 && text.line(0) == Some("") {
        return String::new();
    }
    let mut out = String::new();
    for line in text.lines() {
        out.push_str(line);
        out.push('\n');
    }
    out
}
