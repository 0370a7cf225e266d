//! Outbound event bus for the edit engine.
//!
//! Everything the engine needs to tell the host — per-resource diff updates,
//! iteration rollbacks, session completion, failed batch applications — is
//! normalised into a single [`SessionEvent`] enum and sent over a tokio
//! unbounded MPSC channel. The host owns the receiver and dispatches to its
//! review UI; the sender is cloned into every session the registry creates.
//!
//! The enum is closed (no `#[non_exhaustive]`) so hosts match it
//! exhaustively: adding a variant is a deliberate API change, not something
//! a string-tagged dispatch can silently miss.

use serde::Serialize;
use tokio::sync::mpsc;

use aiedit_core::types::{DiffStat, LineRange};

/// All events the engine raises toward the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SessionEvent {
    /// A batch was applied to `resource` and its diff against the original
    /// snapshot was recomputed. Also raised per resource after an iteration
    /// rollback, tagged with the undone iteration's id.
    #[serde(rename_all = "camelCase")]
    ResourceChanged {
        session_id: String,
        resource: String,
        iteration_id: String,
        /// Aggregate counts for the review summary.
        diff_stat: DiffStat,
        /// The line span the latest change touched, in working-buffer
        /// coordinates — the host scrolls this into view.
        edit_range_in_progress: LineRange,
    },
    /// The most recent iteration was rolled back across all files it
    /// touched. One `ResourceChanged` per affected resource precedes this.
    #[serde(rename_all = "camelCase")]
    IterationUndone {
        session_id: String,
        affected_resources: Vec<String>,
    },
    /// The session was finalized; per-resource decisions are listed.
    #[serde(rename_all = "camelCase")]
    SessionCompleted {
        session_id: String,
        accepted_resources: Vec<String>,
        rejected_resources: Vec<String>,
    },
    /// A batch could not be applied. The resource's diff is unchanged; the
    /// host should show the resource as stalled rather than silently losing
    /// edits.
    #[serde(rename_all = "camelCase")]
    EditApplicationFailed {
        session_id: String,
        resource: String,
        reason: String,
    },
}

/// Holds the sender and receiver ends of the engine's event channel.
///
/// The sender (`tx`) is handed to [`SessionRegistry::new`] and cloned into
/// each session; the receiver (`rx`) is owned by the host's dispatch loop.
///
/// Unbounded is appropriate here: producers emit at most a handful of events
/// per applied batch, and batch application itself is throttled by the
/// bounded per-resource queues, so the channel cannot grow without bound.
///
/// [`SessionRegistry::new`]: crate::registry::SessionRegistry::new
pub struct EventHandler {
    /// Send half — clone for each event producer.
    pub tx: mpsc::UnboundedSender<SessionEvent>,
    /// Receive half — owned by the host; call `.recv().await` for the next
    /// event.
    pub rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl EventHandler {
    /// Creates a new `EventHandler` with a fresh unbounded channel.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}
