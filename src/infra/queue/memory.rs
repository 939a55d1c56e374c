//! In-memory pending queue ordered by priority, FIFO within a priority.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::core::Priority;

/// A task waiting for a free executor slot.
pub struct QueuedTask<P> {
    /// Lower value is served first.
    pub priority: Priority,
    /// Submission sequence number; breaks ties between equal priorities.
    pub seq: u64,
    /// Human-readable label for logs.
    pub label: String,
    /// The work itself.
    pub job: P,
}

impl<P> PartialEq for QueuedTask<P> {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl<P> Eq for QueuedTask<P> {}

impl<P> PartialOrd for QueuedTask<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P> Ord for QueuedTask<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: the "greatest" element pops first, so both keys are reversed.
        match other.priority.cmp(&self.priority) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}

/// Pending queue backed by a binary heap.
/// This provides O(log n) enqueue and O(log n) dequeue operations.
pub struct PendingQueue<P> {
    tasks: BinaryHeap<QueuedTask<P>>,
    next_seq: u64,
}

impl<P> Default for PendingQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> PendingQueue<P> {
    /// Create an empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tasks: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Append a task; returns its sequence number.
    pub fn push(&mut self, priority: Priority, label: impl Into<String>, job: P) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.tasks.push(QueuedTask {
            priority,
            seq,
            label: label.into(),
            job,
        });
        seq
    }

    /// Remove the most urgent task.
    pub fn pop(&mut self) -> Option<QueuedTask<P>> {
        self.tasks.pop()
    }

    /// Priority of the task that would pop next.
    #[must_use]
    pub fn peek_priority(&self) -> Option<Priority> {
        self.tasks.peek().map(|t| t.priority)
    }

    /// Remove every queued task, returning them in no particular order.
    pub fn drain_all(&mut self) -> Vec<QueuedTask<P>> {
        self.tasks.drain().collect()
    }

    /// Current depth.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// True when nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
