//! Debounced persistence scheduling.
//!
//! Writes are coalesced: every mutation marks its chunk id dirty and
//! (re)arms a debounce deadline. When the deadline passes, the whole
//! pending set is flushed in one batch. The state machine is explicit
//! and clock-parameterized, so tests drive it with synthetic instants
//! instead of wall-clock waits; the async driver in the engine supplies
//! real time.
//!
//! Failure never drops data: a failed flush merges its snapshot back
//! into the pending set (newer writes win) and schedules a retry one
//! debounce window later.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::chunk_id::ChunkId;

/// Default quiet period before a flush fires.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(1000);

/// What a dirty chunk id needs written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingOp {
    Upsert,
    Remove,
}

/// Scheduler lifecycle. A flush that completes while new writes sit in
/// the pending set lands in `PendingDirty` rather than `Idle`; those
/// writes were enqueued mid-flush and still owe a write-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    Idle,
    PendingDirty,
    Debouncing,
    Flushing,
}

/// The pending set captured at the start of a flush. Returned to the
/// scheduler on completion so a failure can restore it.
#[derive(Debug)]
pub struct FlushSnapshot {
    ops: HashMap<ChunkId, PendingOp>,
}

impl FlushSnapshot {
    pub fn ops(&self) -> impl Iterator<Item = (ChunkId, PendingOp)> + '_ {
        self.ops.iter().map(|(id, op)| (*id, *op))
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[derive(Debug)]
pub struct PersistenceScheduler {
    window: Duration,
    state: FlushState,
    pending: HashMap<ChunkId, PendingOp>,
    deadline: Option<Instant>,
}

impl PersistenceScheduler {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: FlushState::Idle,
            pending: HashMap::new(),
            deadline: None,
        }
    }

    pub fn state(&self) -> FlushState {
        self.state
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    /// The instant the next flush is due, if one is armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Mark a chunk id dirty and (re)arm the debounce deadline.
    ///
    /// A later op on the same id replaces the earlier one: a remove
    /// after an upsert tombstones it, an upsert after a remove revives
    /// it. Writes arriving mid-flush stay pending for the next cycle.
    pub fn enqueue(&mut self, id: ChunkId, op: PendingOp, now: Instant) {
        self.pending.insert(id, op);
        match self.state {
            FlushState::Flushing => {
                // Captured by the post-flush pending re-check.
            }
            _ => {
                self.state = FlushState::Debouncing;
                self.deadline = Some(now + self.window);
            }
        }
    }

    /// Whether the armed deadline has passed.
    pub fn due(&self, now: Instant) -> bool {
        matches!(
            self.state,
            FlushState::Debouncing | FlushState::PendingDirty
        ) && self.deadline.is_some_and(|d| d <= now)
    }

    /// Begin a flush: snapshot and drain the pending set.
    ///
    /// Returns `None` when there is nothing to write or a flush is
    /// already in progress. Writes that land after this call go into a
    /// fresh pending set and are merged, never overwritten.
    pub fn begin_flush(&mut self) -> Option<FlushSnapshot> {
        if self.state == FlushState::Flushing || self.pending.is_empty() {
            return None;
        }
        self.state = FlushState::Flushing;
        self.deadline = None;
        Some(FlushSnapshot {
            ops: std::mem::take(&mut self.pending),
        })
    }

    /// Record a successful flush. The snapshot's entries are gone for
    /// good; anything enqueued during the flush leaves the scheduler
    /// dirty with the deadline re-armed.
    pub fn flush_succeeded(&mut self, now: Instant) {
        if self.pending.is_empty() {
            self.state = FlushState::Idle;
            self.deadline = None;
        } else {
            self.state = FlushState::PendingDirty;
            self.deadline = Some(now + self.window);
        }
    }

    /// Record a failed flush: restore the snapshot under any writes
    /// that arrived meanwhile and schedule a retry one window out.
    pub fn flush_failed(&mut self, snapshot: FlushSnapshot, now: Instant) {
        let newer = std::mem::replace(&mut self.pending, snapshot.ops);
        self.pending.extend(newer);
        self.state = FlushState::Debouncing;
        self.deadline = Some(now + self.window);
    }
}

impl Default for PersistenceScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_WINDOW)
    }
}
