//! Error taxonomy for the edit engine.
//!
//! Buffer- and queue-level failures are recovered locally (the offending
//! batch is discarded and reported; sibling resources are unaffected). Only
//! registry-level failures — claiming a resource another session owns, or
//! reusing a live session id — are hard synchronous errors, since they
//! indicate a caller-side invariant violation.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// An edit addressed a line or column beyond the buffer, a reversed
    /// range, or a column inside a surrogate pair. The whole batch it
    /// belonged to was discarded.
    #[error("edit out of range in {resource} at {line}:{col}")]
    OutOfRangeEdit { resource: String, line: u32, col: u32 },

    /// An undo target predates the earliest retained snapshot. Callers must
    /// checkpoint before iterations they may need to undo.
    #[error("version {requested} predates retained history (earliest retained: {earliest})")]
    VersionNotReachable { requested: u64, earliest: u64 },

    /// A second session attempted to claim a resource already owned by a
    /// live session.
    #[error("resource {resource} is locked by session {owner}")]
    ResourceLocked { resource: String, owner: String },

    /// The apply callback for a queued batch failed. Isolated to that batch;
    /// the queue keeps draining.
    #[error("apply failed for {resource}: {reason}")]
    QueueApplyFailure { resource: String, reason: String },

    /// The owning session was cancelled before this batch was dequeued.
    #[error("session cancelled")]
    Cancelled,

    /// A session with this id already exists in the registry.
    #[error("session {session_id} already exists")]
    SessionExists { session_id: String },

    /// No session with this id exists in the registry.
    #[error("unknown session {session_id}")]
    UnknownSession { session_id: String },

    /// The session has been completed or disposed; no further mutation is
    /// accepted.
    #[error("session is closed")]
    SessionClosed,
}
