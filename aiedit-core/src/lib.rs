//! aiedit-core — shared primitives for the aiedit edit-session engine.
//!
//! This crate holds the leaf pieces with no orchestration policy in them:
//! versioned text buffers with snapshot undo ([`buffer`]), pure line diffing
//! ([`diff`]), the engine error taxonomy ([`error`]), and the owned wire
//! types exchanged with the host ([`types`]). The `aiedit` crate builds the
//! session, queueing, and registry machinery on top.

pub mod buffer;
pub mod diff;
pub mod error;
pub mod types;

pub use buffer::{EditResult, ImmutableText, TextBuffer};
pub use diff::{compute_diff, DiffKind, DiffRegion, LineDiff};
pub use error::EngineError;
pub use types::{DiffStat, LineRange, Position, Range, ReviewState, TextEdit, TextEditBatch};
