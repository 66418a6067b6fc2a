// Bounded history of finished tasks

use std::collections::VecDeque;

use crate::task::Task;

/// Ring buffer of finished tasks. The oldest entry is evicted when full.
#[derive(Debug)]
pub struct TaskHistory {
    entries: VecDeque<Task>,
    capacity: usize,
}

impl TaskHistory {
    /// Creates a history holding at most `capacity` tasks (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { entries: VecDeque::with_capacity(capacity), capacity }
    }

    /// Appends a finished task, evicting the oldest if needed.
    pub fn push(&mut self, task: Task) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(task);
    }

    /// Finished tasks, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.entries.iter()
    }

    /// Looks up a finished task by id.
    pub fn find(&self, task_id: &str) -> Option<&Task> {
        self.entries.iter().rev().find(|t| t.id == task_id)
    }

    /// Number of retained tasks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has finished yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of retained tasks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Priority, TaskContext, TaskType};

    fn task(id: &str) -> Task {
        Task::with_id(id, TaskType::Manual, Priority::Low, TaskContext::default())
    }

    #[test]
    fn test_evicts_oldest() {
        let mut history = TaskHistory::new(2);
        history.push(task("a"));
        history.push(task("b"));
        history.push(task("c"));

        let ids: Vec<&str> = history.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert!(history.find("a").is_none());
        assert!(history.find("c").is_some());
        assert_eq!(history.len(), history.capacity());
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let mut history = TaskHistory::new(0);
        assert!(history.is_empty());
        history.push(task("a"));
        history.push(task("b"));
        assert_eq!(history.len(), 1);
        assert_eq!(history.find("b").map(|t| t.id.as_str()), Some("b"));
    }
}
