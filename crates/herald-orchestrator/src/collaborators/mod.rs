//! Contracts for the collaborators the pipeline depends on.
//!
//! The orchestration core never talks to storage, the tracker or the
//! notification transport directly; it goes through these traits. In-memory
//! implementations live in [`memory`].

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::task::Task;

pub use memory::{MemoryNotificationHistory, MemoryResultsStore, MemoryStateStore, NotificationRecord, TrackedState};

/// Outcome of structural task validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    /// Whether the task may be queued.
    pub valid: bool,
    /// Why not, when invalid.
    pub error: Option<String>,
}

impl Validation {
    /// A passing validation.
    pub fn ok() -> Self {
        Self { valid: true, error: None }
    }

    /// A failing validation.
    pub fn invalid(error: impl Into<String>) -> Self {
        Self { valid: false, error: Some(error.into()) }
    }
}

/// Outcome of relationship analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationships {
    /// Ids of candidate tasks the analysed task duplicates.
    pub duplicates: Vec<String>,
}

impl Relationships {
    /// Whether the analysed task duplicates any candidate.
    pub fn is_duplicate(&self) -> bool {
        !self.duplicates.is_empty()
    }
}

/// Turns raw events into tasks and judges their relationships.
pub trait Classifier: Send + Sync {
    /// Interpret an event. `None` means the event is not actionable.
    fn interpret_event(&self, event_type: &str, payload: &Value) -> Option<Task>;

    /// Structural validation applied at enqueue.
    fn validate_task(&self, task: &Task) -> Validation;

    /// Compare a task against queued and in-flight candidates.
    fn analyze_relationships(&self, task: &Task, candidates: &[&Task]) -> Relationships;
}

/// Tracked state of work items, builds and pull requests.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Record whatever the task says about its target.
    async fn update_for_task(&self, task: &Task) -> Result<()>;
}

/// Answer to an escalation query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationVerdict {
    /// Whether the threshold was met.
    pub escalate: bool,
    /// Matching records inside the window.
    pub count: u32,
    /// Most recent matching messages, newest first.
    pub recent_samples: Vec<String>,
}

/// History of notifications already sent.
#[async_trait]
pub trait NotificationHistory: Send + Sync {
    /// Whether any notification for `target_id` was sent in the last `window_hours`.
    async fn is_recent_for_target(&self, target_id: &str, window_hours: u64) -> Result<bool>;

    /// Whether `target_id` has reached `threshold` notifications of `category`
    /// in the last `window_hours`.
    async fn should_escalate(
        &self,
        target_id: &str,
        category: &str,
        threshold: u32,
        window_hours: u64,
    ) -> Result<EscalationVerdict>;
}

/// Destination for task results.
#[async_trait]
pub trait ResultsStore: Send + Sync {
    /// Store a record under `key`, replacing any previous one.
    async fn store(&self, key: &str, record: Value) -> Result<()>;

    /// Append a summary to the list under `history_key`.
    async fn append(&self, history_key: &str, summary: Value) -> Result<()>;
}
