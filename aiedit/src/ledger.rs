//! Iteration bookkeeping across all files of a session.
//!
//! An iteration is one agent turn: every batch it produced, across however
//! many files, undoable as a unit. The ledger tracks which applied batches
//! belong to which iteration, in first-seen iteration order, and hands the
//! session the exact set of `(resource, batch)` pairs to unwind when the
//! most recent iteration is rolled back.
//!
//! Iteration lifecycle: it does not exist, then [`begin`](IterationLedger::begin)
//! creates it as `Recording` when its first batch starts applying,
//! [`record`](IterationLedger::record) moves it to `Recorded` once a batch
//! has landed, and [`undo_last`](IterationLedger::undo_last) retires it as
//! `Undone` — terminal. Undone ids live on in a tombstone set so a straggler
//! batch can never resurrect a rolled-back iteration.

use std::collections::HashSet;

/// Lifecycle state of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationState {
    /// Created — its first batch is being applied, nothing recorded yet.
    Recording,
    /// At least one batch applied. The only state undo can leave from.
    Recorded,
    /// Rolled back or emptied. Terminal.
    Undone,
}

/// One applied batch attributed to an iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// The resource the batch mutated.
    pub resource: String,
    /// Stable per-session batch id (index into nothing — ids survive
    /// removal of earlier batches).
    pub batch_id: u64,
}

#[derive(Debug)]
struct Iteration {
    id: String,
    state: IterationState,
    entries: Vec<LedgerEntry>,
}

/// All entries of a popped iteration, in application order.
#[derive(Debug)]
pub struct UndoneIteration {
    pub id: String,
    pub entries: Vec<LedgerEntry>,
}

impl UndoneIteration {
    /// Affected resources, deduplicated, in first-touch order.
    pub fn affected_resources(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for entry in &self.entries {
            if seen.insert(entry.resource.as_str()) {
                out.push(entry.resource.clone());
            }
        }
        out
    }
}

/// Session-scoped iteration ledger.
#[derive(Debug, Default)]
pub struct IterationLedger {
    /// Active iterations in first-seen order.
    iterations: Vec<Iteration>,
    /// Ids of undone iterations — permanently closed to new batches.
    tombstones: HashSet<String>,
}

impl IterationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens `iteration_id` for recording if it is new.
    ///
    /// Returns `false` when the id has been undone — the caller must discard
    /// the batch instead of applying it.
    pub fn begin(&mut self, iteration_id: &str) -> bool {
        if self.tombstones.contains(iteration_id) {
            return false;
        }
        if !self.iterations.iter().any(|it| it.id == iteration_id) {
            self.iterations.push(Iteration {
                id: iteration_id.to_owned(),
                state: IterationState::Recording,
                entries: Vec::new(),
            });
        }
        true
    }

    /// Attributes an applied batch to `iteration_id`.
    ///
    /// Returns `false` (and records nothing) when the id has been undone in
    /// the meantime; the caller must unwind the batch it just applied.
    pub fn record(&mut self, iteration_id: &str, resource: &str, batch_id: u64) -> bool {
        if !self.begin(iteration_id) {
            return false;
        }
        let iteration = self
            .iterations
            .iter_mut()
            .rev()
            .find(|it| it.id == iteration_id)
            .expect("begin() just ensured the iteration exists");
        iteration.entries.push(LedgerEntry { resource: resource.to_owned(), batch_id });
        iteration.state = IterationState::Recorded;
        true
    }

    /// Pops the most recent `Recorded` iteration.
    ///
    /// Only the single most recent non-undone iteration is ever eligible —
    /// undo is LIFO across the whole session, not per resource. The popped
    /// id is tombstoned. Returns `None` when nothing is undoable.
    pub fn undo_last(&mut self) -> Option<UndoneIteration> {
        let idx = self
            .iterations
            .iter()
            .rposition(|it| it.state == IterationState::Recorded)?;
        let iteration = self.iterations.remove(idx);
        self.tombstones.insert(iteration.id.clone());
        tracing::debug!(iteration = %iteration.id, batches = iteration.entries.len(), "iteration undone");
        Some(UndoneIteration { id: iteration.id, entries: iteration.entries })
    }

    /// Drops every entry touching `resource` (after accept/reject).
    ///
    /// A recorded iteration left with zero entries is retired and
    /// tombstoned — it no longer exists to be undone.
    pub fn purge_resource(&mut self, resource: &str) {
        for iteration in &mut self.iterations {
            iteration.entries.retain(|e| e.resource != resource);
        }
        let tombstones = &mut self.tombstones;
        self.iterations.retain(|it| {
            if it.state == IterationState::Recorded && it.entries.is_empty() {
                tombstones.insert(it.id.clone());
                false
            } else {
                true
            }
        });
    }

    /// Removes a single entry, used when a replay during rollback fails and
    /// the batch silently ceases to exist.
    pub fn remove_entry(&mut self, iteration_id: &str, batch_id: u64) {
        for iteration in &mut self.iterations {
            if iteration.id == iteration_id {
                iteration.entries.retain(|e| e.batch_id != batch_id);
            }
        }
    }

    /// True when `iteration_id` was undone earlier in this session.
    pub fn is_tombstoned(&self, iteration_id: &str) -> bool {
        self.tombstones.contains(iteration_id)
    }

    /// Number of iterations still eligible for undo.
    pub fn recorded_count(&self) -> usize {
        self.iterations
            .iter()
            .filter(|it| it.state == IterationState::Recorded)
            .count()
    }
}
