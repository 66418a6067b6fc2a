//! Priority task queue.
//!
//! Orders tasks by severity rank, then by the time of the originating event.
//! Tasks with equal keys leave in the order they arrived.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::task::Task;

/// Heap entry. `BinaryHeap` is a max-heap, so the comparison is reversed:
/// the task that should run first compares greatest.
#[derive(Debug)]
struct QueuedTask {
    seq: u64,
    task: Task,
}

impl QueuedTask {
    fn key(&self) -> (u8, chrono::DateTime<chrono::Utc>, u64) {
        let (rank, event_at) = self.task.sort_key();
        (rank, event_at, self.seq)
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

/// Tasks waiting for a concurrency slot.
#[derive(Debug, Default)]
pub struct TaskQueue {
    heap: BinaryHeap<QueuedTask>,
    next_seq: u64,
}

impl TaskQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task.
    pub fn push(&mut self, task: Task) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueuedTask { seq, task });
    }

    /// Removes the task that should run next.
    pub fn pop(&mut self) -> Option<Task> {
        self.heap.pop().map(|entry| entry.task)
    }

    /// The task that would be popped next.
    pub fn peek(&self) -> Option<&Task> {
        self.heap.peek().map(|entry| &entry.task)
    }

    /// Queued tasks, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.heap.iter().map(|entry| &entry.task)
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drops every queued task, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let dropped = self.heap.len();
        self.heap.clear();
        dropped
    }
}
