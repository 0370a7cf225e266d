//! Integration test for the buffer + diff primitives working together:
//! checkpointed mutation, live diff recomputation, and snapshot undo — the
//! exact cycle the session layer drives for every touched file.

use aiedit_core::buffer::TextBuffer;
use aiedit_core::diff::compute_diff;
use aiedit_core::types::{DiffStat, TextEdit};

#[test]
fn checkpointed_edit_cycle_with_undo() {
    let mut buffer = TextBuffer::new("src/lib.rs", "a\nb\nc", 16);
    let original = buffer.snapshot();

    // Turn one: replace the middle line.
    buffer.checkpoint();
    let turn_one = buffer.version();
    buffer.apply_edits(&[TextEdit::replace(1, 0, 1, 1, "B")]).unwrap();
    let diff = compute_diff(&original, &buffer.snapshot());
    assert_eq!(diff.stat, DiffStat { lines_added: 1, lines_removed: 1 });

    // Turn two: append a line; the diff accumulates against the original.
    buffer.checkpoint();
    let turn_two = buffer.version();
    buffer.apply_edits(&[TextEdit::replace(3, 0, 3, 0, "\nd")]).unwrap();
    let diff = compute_diff(&original, &buffer.snapshot());
    assert_eq!(diff.stat, DiffStat { lines_added: 2, lines_removed: 1 });

    // Undo the second turn only.
    buffer.undo_to(turn_two).unwrap();
    assert_eq!(buffer.snapshot().to_string(), "a\nB\nc");
    let diff = compute_diff(&original, &buffer.snapshot());
    assert_eq!(diff.stat, DiffStat { lines_added: 1, lines_removed: 1 });

    // Undo everything back to the first checkpoint.
    buffer.undo_to(turn_one).unwrap();
    assert_eq!(buffer.snapshot(), original);
    assert!(compute_diff(&original, &buffer.snapshot()).is_identity());
}

#[test]
fn snapshots_share_unchanged_lines_across_versions() {
    let mut buffer = TextBuffer::new("big.rs", &"line\n".repeat(1000), 4);
    let before = buffer.snapshot();
    buffer.apply_edits(&[TextEdit::replace(500, 0, 500, 4, "edited")]).unwrap();
    let after = buffer.snapshot();

    // Content diverges at exactly one line; the other 1000 are shared.
    assert_eq!(before.line(500), Some("line"));
    assert_eq!(after.line(500), Some("edited"));
    assert_eq!(before.line_count(), after.line_count());
    let diff = compute_diff(&before, &after);
    assert_eq!(diff.stat, DiffStat { lines_added: 1, lines_removed: 1 });
}
