//! Versioned, line-indexed text buffers with snapshot-based undo.
//!
//! A [`TextBuffer`] owns the live ("working") content of one resource. Lines
//! are stored as `Arc<str>` behind a shared `Arc<Vec<_>>`, so taking a
//! [`snapshot`](TextBuffer::snapshot) is an `Arc` clone and mutation is
//! copy-on-write: unchanged lines are shared between the working buffer and
//! every retained snapshot.
//!
//! Versioning rules:
//! - `version` strictly increases on every mutation (batch apply or restore).
//! - `alternative_version` advances only on an explicit
//!   [`checkpoint`](TextBuffer::checkpoint), which also anchors the current
//!   content in the retained-snapshot history so it stays reachable by
//!   [`undo_to`](TextBuffer::undo_to).

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::error::EngineError;
use crate::types::{LineRange, Position, TextEdit};

/// An immutable, cheaply clonable snapshot of buffer content.
///
/// Cloning is O(1); two snapshots produced from related buffer states share
/// their unchanged lines. Equality compares content, not identity.
#[derive(Debug, Clone)]
pub struct ImmutableText {
    lines: Arc<Vec<Arc<str>>>,
}

impl ImmutableText {
    /// Builds a snapshot from raw text. `"a\nb"` yields two lines; the empty
    /// string yields a single empty line; a trailing `\n` yields a trailing
    /// empty line.
    pub fn from_text(text: &str) -> Self {
        let lines: Vec<Arc<str>> = text.split('\n').map(Arc::from).collect();
        Self { lines: Arc::new(lines) }
    }

    /// Number of lines. Always at least 1 — an empty document is one empty
    /// line.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// The line at `idx`, without a trailing newline.
    pub fn line(&self, idx: usize) -> Option<&str> {
        self.lines.get(idx).map(|l| l.as_ref())
    }

    /// Iterator over all lines in order.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|l| l.as_ref())
    }

    fn from_lines(lines: Vec<Arc<str>>) -> Self {
        Self { lines: Arc::new(lines) }
    }
}

impl fmt::Display for ImmutableText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            f.write_str(line)?;
        }
        Ok(())
    }
}

impl PartialEq for ImmutableText {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.lines, &other.lines) || self.lines == other.lines
    }
}

impl Eq for ImmutableText {}

/// Outcome of a successful batch application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditResult {
    /// The buffer version after the batch.
    pub version: u64,
    /// Union of the line spans touched by the batch, in post-edit
    /// coordinates. Drives decoration and scroll-into-view in the host.
    pub affected_lines: LineRange,
}

/// The live, mutable text for one resource.
pub struct TextBuffer {
    resource: String,
    lines: Arc<Vec<Arc<str>>>,
    version: u64,
    alternative_version: u64,
    /// Pre-mutation snapshots, oldest first: `(version, content at version)`.
    history: VecDeque<(u64, ImmutableText)>,
    history_limit: usize,
}

impl TextBuffer {
    /// Creates a buffer for `resource` holding `text`, at version 0.
    ///
    /// `history_limit` caps the retained-snapshot count; once exceeded the
    /// oldest snapshot is evicted and versions before it become unreachable
    /// for [`undo_to`](Self::undo_to).
    pub fn new(resource: impl Into<String>, text: &str, history_limit: usize) -> Self {
        Self {
            resource: resource.into(),
            lines: ImmutableText::from_text(text).lines,
            version: 0,
            alternative_version: 0,
            history: VecDeque::new(),
            history_limit: history_limit.max(1),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Current version. Strictly increases on every mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The undo-checkpoint marker; advances only on [`checkpoint`](Self::checkpoint).
    pub fn alternative_version(&self) -> u64 {
        self.alternative_version
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// O(1) snapshot of the current content (structural sharing).
    pub fn snapshot(&self) -> ImmutableText {
        ImmutableText { lines: Arc::clone(&self.lines) }
    }

    /// Applies a batch atomically, in the order given.
    ///
    /// Each edit's range is resolved against the text produced by the
    /// preceding edits of the same batch. If any edit is invalid the whole
    /// batch is abandoned and the buffer is left untouched.
    ///
    /// # Errors
    ///
    /// [`EngineError::OutOfRangeEdit`] when an edit addresses a line or
    /// column beyond the buffer, a reversed range, or a column splitting a
    /// surrogate pair.
    pub fn apply_edits(&mut self, edits: &[TextEdit]) -> Result<EditResult, EngineError> {
        // Shallow clone: Arc-per-line, so failure costs no content copies.
        let mut scratch: Vec<Arc<str>> = self.lines.as_ref().clone();
        let mut affected = LineRange::default();

        for edit in edits {
            let touched = apply_one(&mut scratch, edit, &self.resource)?;
            affected = affected.union(touched);
        }

        self.retain_current();
        self.lines = Arc::new(scratch);
        self.version += 1;
        tracing::trace!(
            resource = %self.resource,
            version = self.version,
            edits = edits.len(),
            "batch applied"
        );
        Ok(EditResult { version: self.version, affected_lines: affected })
    }

    /// Rolls the buffer back to the newest retained snapshot whose version is
    /// `<= target`. A target at or above the current version is a no-op.
    ///
    /// # Errors
    ///
    /// [`EngineError::VersionNotReachable`] when `target` predates the
    /// earliest retained snapshot.
    pub fn undo_to(&mut self, target: u64) -> Result<(), EngineError> {
        if target >= self.version {
            return Ok(());
        }
        let found = self
            .history
            .iter()
            .rev()
            .find(|(v, _)| *v <= target)
            .map(|(v, snap)| (*v, snap.clone()));
        match found {
            Some((v, snap)) => {
                self.lines = snap.lines;
                self.version = v;
                self.history.retain(|(hv, _)| *hv < v);
                Ok(())
            }
            None => {
                let earliest = self.history.front().map(|(v, _)| *v).unwrap_or(self.version);
                Err(EngineError::VersionNotReachable { requested: target, earliest })
            }
        }
    }

    /// Replaces the whole content with `snapshot`. Counts as a mutation:
    /// the version still increases. Returns the new version.
    pub fn restore(&mut self, snapshot: &ImmutableText) -> u64 {
        self.retain_current();
        self.lines = Arc::clone(&snapshot.lines);
        self.version += 1;
        self.version
    }

    /// Marks the current content as an undo anchor: advances
    /// `alternative_version` to the current version and pins the current
    /// snapshot into retained history.
    pub fn checkpoint(&mut self) {
        self.alternative_version = self.version;
        if self.history.back().map(|(v, _)| *v) != Some(self.version) {
            self.push_history(self.version, self.snapshot());
        }
    }

    fn retain_current(&mut self) {
        if self.history.back().map(|(v, _)| *v) == Some(self.version) {
            // checkpoint already pinned this state
            return;
        }
        let snap = self.snapshot();
        self.push_history(self.version, snap);
    }

    fn push_history(&mut self, version: u64, snap: ImmutableText) {
        self.history.push_back((version, snap));
        while self.history.len() > self.history_limit {
            if let Some((evicted, _)) = self.history.pop_front() {
                tracing::trace!(
                    resource = %self.resource,
                    evicted_version = evicted,
                    "snapshot history evicted"
                );
            }
        }
    }
}

impl fmt::Debug for TextBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextBuffer")
            .field("resource", &self.resource)
            .field("version", &self.version)
            .field("alternative_version", &self.alternative_version)
            .field("lines", &self.lines.len())
            .finish()
    }
}

/// Applies one edit to the scratch line vector, returning the touched span
/// in post-edit coordinates.
fn apply_one(
    lines: &mut Vec<Arc<str>>,
    edit: &TextEdit,
    resource: &str,
) -> Result<LineRange, EngineError> {
    if edit.range.is_reversed() {
        return Err(out_of_range(resource, edit.range.end));
    }
    let (start_line, start_byte) = resolve(lines, edit.range.start, resource)?;
    let (end_line, end_byte) = resolve(lines, edit.range.end, resource)?;

    let prefix = &lines[start_line][..start_byte];
    let suffix = &lines[end_line][end_byte..];

    let mut parts = edit.new_text.split('\n');
    // split() always yields at least one (possibly empty) part
    let first = parts.next().unwrap_or("");
    let mut replacement: Vec<Arc<str>> = Vec::new();
    let mut tail: Vec<&str> = parts.collect();
    match tail.pop() {
        None => {
            replacement.push(Arc::from(format!("{prefix}{first}{suffix}").as_str()));
        }
        Some(last) => {
            replacement.push(Arc::from(format!("{prefix}{first}").as_str()));
            for mid in tail {
                replacement.push(Arc::from(mid));
            }
            replacement.push(Arc::from(format!("{last}{suffix}").as_str()));
        }
    }

    let touched = LineRange::new(start_line as u32, (start_line + replacement.len()) as u32);
    lines.splice(start_line..=end_line, replacement);
    Ok(touched)
}

/// Resolves a position to `(line index, byte offset within that line)`.
///
/// `(line_count, 0)` is accepted as the end-of-document position and
/// normalized to the end of the last line. Columns count UTF-16 code units.
fn resolve(
    lines: &[Arc<str>],
    pos: Position,
    resource: &str,
) -> Result<(usize, usize), EngineError> {
    let line_idx = pos.line as usize;
    if line_idx == lines.len() && pos.col == 0 {
        let last = lines.len() - 1;
        return Ok((last, lines[last].len()));
    }
    let line = lines.get(line_idx).ok_or_else(|| out_of_range(resource, pos))?;
    let byte = byte_offset_for_col(line, pos.col).ok_or_else(|| out_of_range(resource, pos))?;
    Ok((line_idx, byte))
}

/// Maps a UTF-16 column to a byte offset within `line`.
///
/// Returns `None` when the column is past the end of the line or lands
/// between the two code units of a surrogate pair.
fn byte_offset_for_col(line: &str, col: u32) -> Option<usize> {
    let mut units: u32 = 0;
    if col == 0 {
        return Some(0);
    }
    for (byte_idx, ch) in line.char_indices() {
        if units == col {
            return Some(byte_idx);
        }
        units += ch.len_utf16() as u32;
        if units > col {
            return None;
        }
    }
    (units == col).then_some(line.len())
}

fn out_of_range(resource: &str, pos: Position) -> EngineError {
    EngineError::OutOfRangeEdit { resource: resource.to_owned(), line: pos.line, col: pos.col }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit(sl: u32, sc: u32, el: u32, ec: u32, text: &str) -> TextEdit {
        TextEdit::replace(sl, sc, el, ec, text)
    }

    #[test]
    fn empty_text_is_one_empty_line() {
        let snap = ImmutableText::from_text("");
        assert_eq!(snap.line_count(), 1);
        assert_eq!(snap.line(0), Some(""));
        assert_eq!(snap.to_string(), "");
    }

    #[test]
    fn single_line_replace() {
        let mut buf = TextBuffer::new("f", "hello world", 8);
        let result = buf.apply_edits(&[edit(0, 6, 0, 11, "there")]).unwrap();
        assert_eq!(buf.snapshot().to_string(), "hello there");
        assert_eq!(result.version, 1);
        assert_eq!(result.affected_lines, LineRange::new(0, 1));
    }

    #[test]
    fn multiline_splice_and_join() {
        let mut buf = TextBuffer::new("f", "one\ntwo\nthree", 8);
        // replace "two\nth" with "2\n2\n2"
        buf.apply_edits(&[edit(1, 0, 2, 2, "2\n2\n2")]).unwrap();
        assert_eq!(buf.snapshot().to_string(), "one\n2\n2\n2ree");
    }

    #[test]
    fn insertion_at_end_of_document() {
        let mut buf = TextBuffer::new("f", "a\nb\nc", 8);
        buf.apply_edits(&[edit(3, 0, 3, 0, "\nd")]).unwrap();
        assert_eq!(buf.snapshot().to_string(), "a\nb\nc\nd");
    }

    #[test]
    fn utf16_column_addressing() {
        // "héllo" — 'é' is one UTF-16 unit but two bytes.
        let mut buf = TextBuffer::new("f", "héllo", 8);
        buf.apply_edits(&[edit(0, 1, 0, 2, "E")]).unwrap();
        assert_eq!(buf.snapshot().to_string(), "hEllo");

        // "𝄞x" — the clef is a surrogate pair (two UTF-16 units).
        let mut buf = TextBuffer::new("f", "𝄞x", 8);
        buf.apply_edits(&[edit(0, 2, 0, 3, "y")]).unwrap();
        assert_eq!(buf.snapshot().to_string(), "𝄞y");
        // column 1 splits the pair
        let err = buf.apply_edits(&[edit(0, 1, 0, 2, "z")]).unwrap_err();
        assert!(matches!(err, EngineError::OutOfRangeEdit { .. }));
    }

    #[test]
    fn batch_is_atomic_on_failure() {
        let mut buf = TextBuffer::new("f", "a\nb", 8);
        let before = buf.snapshot();
        let err = buf
            .apply_edits(&[edit(0, 0, 0, 1, "X"), edit(9, 0, 9, 1, "boom")])
            .unwrap_err();
        assert!(matches!(err, EngineError::OutOfRangeEdit { .. }));
        assert_eq!(buf.snapshot(), before);
        assert_eq!(buf.version(), 0);
    }

    #[test]
    fn reversed_range_rejected() {
        let mut buf = TextBuffer::new("f", "abc", 8);
        let err = buf.apply_edits(&[edit(0, 2, 0, 1, "x")]).unwrap_err();
        assert!(matches!(err, EngineError::OutOfRangeEdit { .. }));
    }

    #[test]
    fn undo_to_restores_retained_version() {
        let mut buf = TextBuffer::new("f", "v0", 8);
        buf.apply_edits(&[edit(0, 0, 0, 2, "v1")]).unwrap();
        buf.apply_edits(&[edit(0, 0, 0, 2, "v2")]).unwrap();
        assert_eq!(buf.version(), 2);
        buf.undo_to(1).unwrap();
        assert_eq!(buf.snapshot().to_string(), "v1");
        assert_eq!(buf.version(), 1);
    }

    #[test]
    fn undo_past_history_fails() {
        let mut buf = TextBuffer::new("f", "v0", 2);
        for i in 1..=5u32 {
            buf.apply_edits(&[edit(0, 0, 0, 2, &format!("v{i}"))]).unwrap();
        }
        // limit 2 retains only versions 3 and 4
        let err = buf.undo_to(0).unwrap_err();
        assert_eq!(err, EngineError::VersionNotReachable { requested: 0, earliest: 3 });
        buf.undo_to(4).unwrap();
        assert_eq!(buf.snapshot().to_string(), "v4");
    }

    #[test]
    fn checkpoint_advances_alternative_version_only() {
        let mut buf = TextBuffer::new("f", "x", 8);
        assert_eq!(buf.alternative_version(), 0);
        buf.apply_edits(&[edit(0, 0, 0, 1, "y")]).unwrap();
        assert_eq!(buf.alternative_version(), 0);
        buf.checkpoint();
        assert_eq!(buf.alternative_version(), 1);
        assert_eq!(buf.version(), 1);
    }

    #[test]
    fn snapshots_are_stable_across_mutation() {
        let mut buf = TextBuffer::new("f", "a\nb", 8);
        let snap = buf.snapshot();
        buf.apply_edits(&[edit(0, 0, 0, 1, "z")]).unwrap();
        assert_eq!(snap.to_string(), "a\nb");
        assert_eq!(buf.snapshot().to_string(), "z\nb");
    }
}
