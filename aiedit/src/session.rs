//! The edit session orchestrator.
//!
//! An [`EditSession`] owns everything one agent request touches: a buffer
//! pair (frozen original + live working copy) per resource, one
//! [`EditQueue`] per resource, the session's [`IterationLedger`], and the
//! outbound event sender. It is the only writer of its buffers for the
//! session's lifetime — the registry's claim map enforces that.
//!
//! Locking layout: the resource map and ledger sit behind `parking_lot`
//! mutexes and are never held across an `.await`; each resource's buffer
//! state sits behind its own `tokio::sync::Mutex`, held for the duration of
//! one batch application (including the diff recomputation, the one slow
//! step). Rollback takes the affected resources' locks in sorted order, so
//! it serializes against in-flight applies without ever deadlocking them.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex as AsyncMutex;

use aiedit_core::buffer::{ImmutableText, TextBuffer};
use aiedit_core::diff::{compute_diff, LineDiff};
use aiedit_core::error::EngineError;
use aiedit_core::types::{LineRange, ReviewState, TextEdit};

use crate::config::EngineConfig;
use crate::event::SessionEvent;
use crate::ledger::{IterationLedger, UndoneIteration};
use crate::queue::EditQueue;
use crate::registry::ResourceClaims;

/// One batch that has landed on a resource's working buffer.
///
/// `pre`/`post` snapshots make rollback and `snapshot_at` cheap: structural
/// sharing means retaining them costs only the lines each batch changed.
#[derive(Debug)]
struct AppliedBatch {
    /// Session-unique id; stable across removals of earlier batches.
    batch_id: u64,
    iteration_id: String,
    edits: Vec<TextEdit>,
    /// Buffer version immediately before this batch.
    pre_version: u64,
    /// Content immediately before this batch.
    pre: ImmutableText,
    /// Content immediately after this batch.
    post: ImmutableText,
}

/// Mutable per-resource state, guarded by its own async mutex.
#[derive(Debug)]
struct ResourceState {
    /// Frozen at first touch; the diff baseline. Re-pointed at the working
    /// content on accept, which retires the old snapshot.
    original: ImmutableText,
    working: TextBuffer,
    applied: Vec<AppliedBatch>,
    /// `Some` once the user decided; terminal for this session.
    decision: Option<ReviewState>,
    last_diff: LineDiff,
}

impl ResourceState {
    /// Derived review classification; `None` means untouched.
    fn review_state(&self) -> Option<ReviewState> {
        match self.decision {
            Some(d) => Some(d),
            None if !self.applied.is_empty() => Some(ReviewState::Modified),
            None => None,
        }
    }
}

#[derive(Debug)]
struct ResourceEntry {
    queue: EditQueue,
    state: Arc<AsyncMutex<ResourceState>>,
}

/// One agent request's edit session.
///
/// Created through [`SessionRegistry::create`]; all entry points take
/// `&self` and are safe to call concurrently.
///
/// [`SessionRegistry::create`]: crate::registry::SessionRegistry::create
#[derive(Debug)]
pub struct EditSession {
    session_id: String,
    config: EngineConfig,
    events: UnboundedSender<SessionEvent>,
    claims: Arc<ResourceClaims>,
    cancelled: Arc<AtomicBool>,
    closed: AtomicBool,
    ledger: Arc<Mutex<IterationLedger>>,
    resources: Mutex<HashMap<String, ResourceEntry>>,
    next_batch_id: Arc<AtomicU64>,
}

impl EditSession {
    pub(crate) fn new(
        session_id: String,
        config: EngineConfig,
        events: UnboundedSender<SessionEvent>,
        claims: Arc<ResourceClaims>,
    ) -> Arc<Self> {
        Arc::new(Self {
            session_id,
            config,
            events,
            claims,
            cancelled: Arc::new(AtomicBool::new(false)),
            closed: AtomicBool::new(false),
            ledger: Arc::new(Mutex::new(IterationLedger::new())),
            resources: Mutex::new(HashMap::new()),
            next_batch_id: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Registers `resource` with its current on-disk/editor content as the
    /// diff baseline. Idempotent: re-opening an already-open resource keeps
    /// the existing buffer pair untouched.
    ///
    /// Workspace access is out of the engine's scope, so the host supplies
    /// the text. A batch targeting a resource that was never opened opens it
    /// lazily with empty content (the agent-creates-a-new-file case).
    ///
    /// # Errors
    ///
    /// [`EngineError::ResourceLocked`] when another live session owns the
    /// resource, [`EngineError::SessionClosed`] after completion.
    pub fn open_resource(&self, resource: &str, text: &str) -> Result<(), EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::SessionClosed);
        }
        self.ensure_resource(resource, text).map(|_| ())
    }

    /// Applies one batch of edits to `resource` under `iteration_id`.
    ///
    /// The batch is routed through the resource's queue: batches for the
    /// same resource apply strictly in the order this method admits them,
    /// regardless of which iteration they belong to; batches for different
    /// resources proceed independently. The returned future resolves when
    /// this batch has been applied (or discarded) — on success a
    /// [`SessionEvent::ResourceChanged`] with the recomputed diff has
    /// already been emitted.
    ///
    /// # Errors
    ///
    /// [`EngineError::ResourceLocked`] (another session owns the resource),
    /// [`EngineError::Cancelled`], [`EngineError::SessionClosed`], or the
    /// batch's own application failure ([`EngineError::OutOfRangeEdit`] /
    /// [`EngineError::QueueApplyFailure`]) — which is also reported as a
    /// [`SessionEvent::EditApplicationFailed`] and never poisons the
    /// session or any sibling resource.
    pub async fn apply_progress(
        &self,
        resource: &str,
        iteration_id: &str,
        edits: Vec<TextEdit>,
    ) -> Result<(), EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::SessionClosed);
        }
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(EngineError::Cancelled);
        }
        let (queue, state) = self.ensure_resource(resource, "")?;

        let ctx = ApplyContext {
            state,
            ledger: Arc::clone(&self.ledger),
            events: self.events.clone(),
            session_id: self.session_id.clone(),
            resource: resource.to_owned(),
            iteration_id: iteration_id.to_owned(),
            next_batch_id: Arc::clone(&self.next_batch_id),
        };
        queue.enqueue(Box::pin(ctx.apply(edits))).await
    }

    /// Rolls back the most recent iteration across every file it touched.
    ///
    /// Returns exactly the affected resources (so the host refreshes N
    /// diffs, not the whole session); empty when nothing is undoable. Each
    /// affected resource gets a fresh [`SessionEvent::ResourceChanged`],
    /// followed by one [`SessionEvent::IterationUndone`].
    ///
    /// Later iterations touching the same resource survive: their batches
    /// are replayed verbatim on top of the restored text. A replayed batch
    /// whose ranges no longer resolve is dropped with a warning — a later
    /// edit may depend on text the undone iteration introduced, and this
    /// engine deliberately does not chase that dependency.
    pub async fn undo_last_iteration(&self) -> Vec<String> {
        let undone = { self.ledger.lock().undo_last() };
        let Some(undone) = undone else {
            return Vec::new();
        };
        let affected = undone.affected_resources();

        // Sorted acquisition order; concurrent rollbacks can never deadlock.
        let mut ordered = affected.clone();
        ordered.sort();
        for resource in &ordered {
            let state = self.resource_state(resource);
            let Some(state) = state else { continue };
            let mut st = state.lock().await;
            self.rollback_resource(&mut st, resource, &undone);
        }

        self.emit(SessionEvent::IterationUndone {
            session_id: self.session_id.clone(),
            affected_resources: affected.clone(),
        });
        affected
    }

    /// Marks the given resources (all touched resources when `None`)
    /// Accepted: the working content becomes the committed content and the
    /// original snapshot is dropped — no further diffing for those files.
    ///
    /// Idempotent, and a no-op (not an error) for resources with no pending
    /// edits or an earlier terminal decision.
    pub async fn accept(&self, resources: Option<&[String]>) {
        for resource in self.targets(resources) {
            let Some(state) = self.resource_state(&resource) else { continue };
            let mut st = state.lock().await;
            if st.decision.is_some() || st.applied.is_empty() {
                continue;
            }
            st.decision = Some(ReviewState::Accepted);
            st.original = st.working.snapshot();
            st.applied.clear();
            st.last_diff = LineDiff::default();
            self.ledger.lock().purge_resource(&resource);
            tracing::debug!(session = %self.session_id, resource = %resource, "resource accepted");
        }
    }

    /// Restores the given resources (all touched resources when `None`) to
    /// their original snapshots and marks them Rejected. Idempotent; a
    /// resource that was already accepted keeps its accepted content.
    pub async fn reject(&self, resources: Option<&[String]>) {
        for resource in self.targets(resources) {
            let Some(state) = self.resource_state(&resource) else { continue };
            let mut st = state.lock().await;
            if st.decision.is_some() || st.applied.is_empty() {
                continue;
            }
            st.decision = Some(ReviewState::Rejected);
            let original = st.original.clone();
            st.working.restore(&original);
            st.applied.clear();
            st.last_diff = LineDiff::default();
            self.ledger.lock().purge_resource(&resource);
            tracing::debug!(session = %self.session_id, resource = %resource, "resource rejected");
        }
    }

    /// Stops admitting batches. Batches already queued drain as `Cancelled`
    /// without running; already-applied edits stay visible pending
    /// accept/reject.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
        tracing::debug!(session = %self.session_id, "session cancelled");
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Finalizes the session: emits [`SessionEvent::SessionCompleted`] with
    /// the per-resource decisions, releases the registry claims, and closes
    /// the session to further mutation. Returns `(accepted, rejected)`.
    /// Calling it again is a no-op returning empty lists.
    pub async fn complete(&self) -> (Vec<String>, Vec<String>) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return (Vec::new(), Vec::new());
        }
        let entries: Vec<(String, Arc<AsyncMutex<ResourceState>>)> = {
            let map = self.resources.lock();
            map.iter().map(|(r, e)| (r.clone(), Arc::clone(&e.state))).collect()
        };
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for (resource, state) in entries {
            let st = state.lock().await;
            match st.decision {
                Some(ReviewState::Accepted) => accepted.push(resource),
                Some(ReviewState::Rejected) => rejected.push(resource),
                _ => {}
            }
        }
        accepted.sort();
        rejected.sort();
        self.claims.release_session(&self.session_id);
        self.emit(SessionEvent::SessionCompleted {
            session_id: self.session_id.clone(),
            accepted_resources: accepted.clone(),
            rejected_resources: rejected.clone(),
        });
        (accepted, rejected)
    }

    // --- read-only accessors (never mutate session state) ---

    /// Resources currently in the active review set: touched by at least
    /// one applied batch or carrying a terminal decision.
    pub async fn resources(&self) -> Vec<String> {
        let entries: Vec<(String, Arc<AsyncMutex<ResourceState>>)> = {
            let map = self.resources.lock();
            map.iter().map(|(r, e)| (r.clone(), Arc::clone(&e.state))).collect()
        };
        let mut out = Vec::new();
        for (resource, state) in entries {
            let st = state.lock().await;
            if st.review_state().is_some() {
                out.push(resource);
            }
        }
        out.sort();
        out
    }

    /// Derived review classification for `resource`; `None` when untouched
    /// or unknown.
    pub async fn review_state(&self, resource: &str) -> Option<ReviewState> {
        let state = self.resource_state(resource)?;
        let st = state.lock().await;
        st.review_state()
    }

    /// The most recently computed original-vs-working diff for `resource`.
    pub async fn diff(&self, resource: &str) -> Option<LineDiff> {
        let state = self.resource_state(resource)?;
        let st = state.lock().await;
        Some(st.last_diff.clone())
    }

    /// Current working content of `resource`.
    pub async fn working_text(&self, resource: &str) -> Option<String> {
        let state = self.resource_state(resource)?;
        let st = state.lock().await;
        Some(st.working.snapshot().to_string())
    }

    /// Content of `resource` as it stood right after the last applied batch
    /// of `iteration_id`. `None` when that iteration never touched the
    /// resource (or its batches were since removed).
    pub async fn snapshot_at(&self, iteration_id: &str, resource: &str) -> Option<ImmutableText> {
        let state = self.resource_state(resource)?;
        let st = state.lock().await;
        st.applied
            .iter()
            .rev()
            .find(|b| b.iteration_id == iteration_id)
            .map(|b| b.post.clone())
    }

    // --- internals ---

    fn ensure_resource(
        &self,
        resource: &str,
        initial_text: &str,
    ) -> Result<(EditQueue, Arc<AsyncMutex<ResourceState>>), EngineError> {
        let mut map = self.resources.lock();
        if let Some(entry) = map.get(resource) {
            return Ok((entry.queue.clone(), Arc::clone(&entry.state)));
        }
        self.claims.claim(resource, &self.session_id)?;
        let working = TextBuffer::new(resource, initial_text, self.config.history_limit);
        let original = working.snapshot();
        let state = Arc::new(AsyncMutex::new(ResourceState {
            original,
            working,
            applied: Vec::new(),
            decision: None,
            last_diff: LineDiff::default(),
        }));
        let queue = EditQueue::spawn(
            resource.to_owned(),
            self.config.queue_capacity,
            Arc::clone(&self.cancelled),
        );
        tracing::debug!(session = %self.session_id, resource = %resource, "resource opened");
        map.insert(
            resource.to_owned(),
            ResourceEntry { queue: queue.clone(), state: Arc::clone(&state) },
        );
        Ok((queue, state))
    }

    fn resource_state(&self, resource: &str) -> Option<Arc<AsyncMutex<ResourceState>>> {
        self.resources.lock().get(resource).map(|e| Arc::clone(&e.state))
    }

    fn targets(&self, resources: Option<&[String]>) -> Vec<String> {
        match resources {
            Some(list) => list.to_vec(),
            None => self.resources.lock().keys().cloned().collect(),
        }
    }

    /// Unwinds one resource after its iteration entries were popped.
    fn rollback_resource(&self, st: &mut ResourceState, resource: &str, undone: &UndoneIteration) {
        let remove: HashSet<u64> = undone
            .entries
            .iter()
            .filter(|e| e.resource == resource)
            .map(|e| e.batch_id)
            .collect();
        let Some(first_idx) = st.applied.iter().position(|b| remove.contains(&b.batch_id)) else {
            return;
        };
        let anchor_version = st.applied[first_idx].pre_version;
        let anchor = st.applied[first_idx].pre.clone();

        let tail_only = st.applied[first_idx..].iter().all(|b| remove.contains(&b.batch_id));
        if tail_only {
            // Fast path: the undone batches are the newest edits on this
            // resource, so retained history reaches the anchor directly.
            if let Err(e) = st.working.undo_to(anchor_version) {
                tracing::warn!(resource = %resource, error = %e, "undo target evicted, restoring snapshot");
                st.working.restore(&anchor);
            }
            st.applied.truncate(first_idx);
        } else {
            // Interleaved case: restore the anchor, then replay every later
            // batch that belongs to a surviving iteration.
            st.working.restore(&anchor);
            let candidates: Vec<AppliedBatch> = st
                .applied
                .split_off(first_idx)
                .into_iter()
                .filter(|b| !remove.contains(&b.batch_id))
                .collect();
            for batch in candidates {
                let pre_version = st.working.version();
                let pre = st.working.snapshot();
                match st.working.apply_edits(&batch.edits) {
                    Ok(_) => {
                        let post = st.working.snapshot();
                        st.applied.push(AppliedBatch {
                            batch_id: batch.batch_id,
                            iteration_id: batch.iteration_id,
                            edits: batch.edits,
                            pre_version,
                            pre,
                            post,
                        });
                    }
                    Err(e) => {
                        tracing::warn!(
                            resource = %resource,
                            iteration = %batch.iteration_id,
                            error = %e,
                            "replay failed after rollback, dropping batch"
                        );
                        self.ledger.lock().remove_entry(&batch.iteration_id, batch.batch_id);
                    }
                }
            }
        }

        let snapshot = st.working.snapshot();
        let diff = compute_diff(&st.original, &snapshot);
        st.last_diff = diff.clone();
        self.emit(SessionEvent::ResourceChanged {
            session_id: self.session_id.clone(),
            resource: resource.to_owned(),
            iteration_id: undone.id.clone(),
            diff_stat: diff.stat,
            edit_range_in_progress: LineRange::default(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        // Receiver may be gone during host shutdown; events are best-effort.
        let _ = self.events.send(event);
    }
}

/// Everything one queued apply job needs, owned so the job is `'static`.
struct ApplyContext {
    state: Arc<AsyncMutex<ResourceState>>,
    ledger: Arc<Mutex<IterationLedger>>,
    events: UnboundedSender<SessionEvent>,
    session_id: String,
    resource: String,
    iteration_id: String,
    next_batch_id: Arc<AtomicU64>,
}

impl ApplyContext {
    async fn apply(self, edits: Vec<TextEdit>) -> Result<(), EngineError> {
        let mut st = self.state.lock().await;

        if let Some(decision) = st.decision {
            let reason = format!(
                "resource already {}",
                match decision {
                    ReviewState::Accepted => "accepted",
                    ReviewState::Rejected => "rejected",
                    ReviewState::Modified => "decided",
                }
            );
            self.fail(&reason);
            return Err(EngineError::QueueApplyFailure {
                resource: self.resource.clone(),
                reason,
            });
        }

        if !self.ledger.lock().begin(&self.iteration_id) {
            let reason = format!("iteration {} was undone", self.iteration_id);
            self.fail(&reason);
            return Err(EngineError::QueueApplyFailure {
                resource: self.resource.clone(),
                reason,
            });
        }

        // First batch of this iteration on this resource: pin an undo anchor.
        if st.applied.iter().all(|b| b.iteration_id != self.iteration_id) {
            st.working.checkpoint();
        }

        let pre_version = st.working.version();
        let pre = st.working.snapshot();
        let result = match st.working.apply_edits(&edits) {
            Ok(r) => r,
            Err(e) => {
                self.fail(&e.to_string());
                return Err(e);
            }
        };
        let post = st.working.snapshot();

        let batch_id = self.next_batch_id.fetch_add(1, Ordering::SeqCst);
        if !self.ledger.lock().record(&self.iteration_id, &self.resource, batch_id) {
            // The iteration was undone between begin and record. Unwind the
            // application; the batch never happened.
            st.working.restore(&pre);
            let reason = format!("iteration {} was undone", self.iteration_id);
            self.fail(&reason);
            return Err(EngineError::QueueApplyFailure {
                resource: self.resource.clone(),
                reason,
            });
        }

        st.applied.push(AppliedBatch {
            batch_id,
            iteration_id: self.iteration_id.clone(),
            edits,
            pre_version,
            pre,
            post: post.clone(),
        });

        let diff = compute_diff(&st.original, &post);
        st.last_diff = diff.clone();
        tracing::debug!(
            session = %self.session_id,
            resource = %self.resource,
            iteration = %self.iteration_id,
            added = diff.stat.lines_added,
            removed = diff.stat.lines_removed,
            "batch applied"
        );
        let _ = self.events.send(SessionEvent::ResourceChanged {
            session_id: self.session_id.clone(),
            resource: self.resource.clone(),
            iteration_id: self.iteration_id.clone(),
            diff_stat: diff.stat,
            edit_range_in_progress: result.affected_lines,
        });
        Ok(())
    }

    fn fail(&self, reason: &str) {
        tracing::debug!(
            session = %self.session_id,
            resource = %self.resource,
            reason = %reason,
            "batch discarded"
        );
        let _ = self.events.send(SessionEvent::EditApplicationFailed {
            session_id: self.session_id.clone(),
            resource: self.resource.clone(),
            reason: reason.to_owned(),
        });
    }
}
