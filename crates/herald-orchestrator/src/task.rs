//! Task model.
//!
//! A [`Task`] is the unit of work derived from one external event. Its
//! priority and context are fixed when it is enqueued; afterwards only the
//! status, timestamps, error and merged execution change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::execution::Execution;

/// Kind of event a task was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// A work item was created.
    ItemCreated,
    /// A work item changed (fields or state).
    ItemUpdated,
    /// A CI build finished.
    BuildCompleted,
    /// A pull request was opened.
    PrCreated,
    /// A pull request changed.
    PrUpdated,
    /// Periodic sweep of work items.
    PollingItems,
    /// Periodic sweep of builds.
    PollingBuilds,
    /// Periodic sweep of pull requests.
    PollingPullRequests,
    /// Operator-requested task.
    Manual,
}

impl TaskType {
    /// All task types, in declaration order.
    pub const ALL: [TaskType; 9] = [
        Self::ItemCreated,
        Self::ItemUpdated,
        Self::BuildCompleted,
        Self::PrCreated,
        Self::PrUpdated,
        Self::PollingItems,
        Self::PollingBuilds,
        Self::PollingPullRequests,
        Self::Manual,
    ];

    /// Stable string form, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ItemCreated => "item_created",
            Self::ItemUpdated => "item_updated",
            Self::BuildCompleted => "build_completed",
            Self::PrCreated => "pr_created",
            Self::PrUpdated => "pr_updated",
            Self::PollingItems => "polling_items",
            Self::PollingBuilds => "polling_builds",
            Self::PollingPullRequests => "polling_pull_requests",
            Self::Manual => "manual",
        }
    }

    /// Whether the task is a periodic sweep rather than a single-target event.
    pub fn is_polling(self) -> bool {
        matches!(self, Self::PollingItems | Self::PollingBuilds | Self::PollingPullRequests)
    }

    /// Whether a task of this type must name a target.
    pub fn requires_target(self) -> bool {
        !self.is_polling() && self != Self::Manual
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown task type: {s}"))
    }
}

/// Task priority. Declaration order is severity order, so the derived `Ord`
/// sorts the most severe priority first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Needs attention immediately.
    Critical,
    /// Important, ahead of routine work.
    High,
    /// Routine work.
    #[default]
    Medium,
    /// Background work.
    Low,
}

impl Priority {
    /// Severity rank, 0 being the most severe.
    pub fn rank(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        };
        f.write_str(s)
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" | "normal" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in the queue.
    #[default]
    Queued,
    /// Planned and executing.
    Processing,
    /// Every executed step succeeded.
    Completed,
    /// Executed, but some steps failed.
    Partial,
    /// Planning or execution failed.
    Failed,
}

impl TaskStatus {
    /// Whether the task has reached a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Partial | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Scalar fields extracted from the event payload, used for planning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContext {
    /// Work item, build or pull request the event concerns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    /// State before the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<String>,
    /// State after the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_state: Option<String>,
    /// Build result (`succeeded`, `failed`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Any other scalar fields worth keeping.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl TaskContext {
    /// Context for a single target.
    pub fn for_target(target_id: impl Into<String>) -> Self {
        Self { target_id: Some(target_id.into()), ..Self::default() }
    }

    /// Sets the state transition.
    #[must_use]
    pub fn with_transition(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.previous_state = Some(from.into());
        self.new_state = Some(to.into());
        self
    }

    /// Sets the build result.
    #[must_use]
    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    /// Adds an extra field.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Whether the build result denotes a failure.
    pub fn is_failure_result(&self) -> bool {
        self.result.as_deref().is_some_and(|r| {
            matches!(r.to_ascii_lowercase().as_str(), "failed" | "failure")
        })
    }
}

/// Timestamps recorded over a task's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTimestamps {
    /// When the originating event happened. Used for queue tie-breaking.
    pub event_at: DateTime<Utc>,
    /// When the task was created by the classifier.
    pub created_at: DateTime<Utc>,
    /// When the task entered the queue.
    pub queued_at: Option<DateTime<Utc>>,
    /// When processing started.
    pub started_at: Option<DateTime<Utc>>,
    /// When processing finished.
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskTimestamps {
    fn at(event_at: DateTime<Utc>) -> Self {
        Self { event_at, created_at: Utc::now(), queued_at: None, started_at: None, completed_at: None }
    }
}

/// A classified unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier.
    pub id: String,
    /// Event kind.
    pub task_type: TaskType,
    /// Scheduling priority.
    pub priority: Priority,
    /// Raw event body.
    pub payload: Value,
    /// Extracted planning fields.
    pub context: TaskContext,
    /// Lifecycle state.
    pub status: TaskStatus,
    /// Lifecycle timestamps.
    pub timestamps: TaskTimestamps,
    /// Ids of tasks this one was judged a duplicate of.
    #[serde(default)]
    pub relationships: Vec<String>,
    /// Failure message, for failed tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Execution record merged after processing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<Execution>,
}

impl Task {
    /// Creates a task with a fresh id whose event happened now.
    pub fn new(task_type: TaskType, priority: Priority, context: TaskContext) -> Self {
        Self::with_id(format!("task-{}", uuid::Uuid::new_v4()), task_type, priority, context)
    }

    /// Creates a task with an explicit id.
    pub fn with_id(
        id: impl Into<String>,
        task_type: TaskType,
        priority: Priority,
        context: TaskContext,
    ) -> Self {
        Self {
            id: id.into(),
            task_type,
            priority,
            payload: Value::Null,
            context,
            status: TaskStatus::Queued,
            timestamps: TaskTimestamps::at(Utc::now()),
            relationships: Vec::new(),
            error: None,
            execution: None,
        }
    }

    /// Attaches the raw event body.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Overrides the event timestamp.
    #[must_use]
    pub fn with_event_time(mut self, event_at: DateTime<Utc>) -> Self {
        self.timestamps.event_at = event_at;
        self
    }

    /// Target id, or an empty string when the task has none.
    pub fn target(&self) -> &str {
        self.context.target_id.as_deref().unwrap_or_default()
    }

    /// Queue ordering key: severity rank, then event time.
    pub fn sort_key(&self) -> (u8, DateTime<Utc>) {
        (self.priority.rank(), self.timestamps.event_at)
    }

    /// Category used when counting prior failures for escalation.
    pub fn escalation_category(&self) -> String {
        match self.task_type {
            TaskType::BuildCompleted if self.context.is_failure_result() => "build_failure".to_string(),
            TaskType::BuildCompleted => "build_success".to_string(),
            other => other.as_str().to_string(),
        }
    }

    pub(crate) fn mark_queued(&mut self) {
        self.status = TaskStatus::Queued;
        self.timestamps.queued_at = Some(Utc::now());
    }

    pub(crate) fn mark_processing(&mut self) {
        self.status = TaskStatus::Processing;
        self.timestamps.started_at = Some(Utc::now());
    }

    pub(crate) fn finish(&mut self, status: TaskStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        self.timestamps.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_orders_by_severity() {
        let mut priorities = vec![Priority::Low, Priority::Critical, Priority::Medium, Priority::High];
        priorities.sort();
        assert_eq!(priorities, vec![Priority::Critical, Priority::High, Priority::Medium, Priority::Low]);
        assert_eq!(Priority::Critical.rank(), 0);
        assert_eq!(Priority::Low.rank(), 3);
    }

    #[test]
    fn test_task_type_round_trips_through_str() {
        for task_type in TaskType::ALL {
            assert_eq!(task_type.as_str().parse::<TaskType>().unwrap(), task_type);
        }
        assert!("item_deleted".parse::<TaskType>().is_err());
    }

    #[test]
    fn test_requires_target() {
        assert!(TaskType::BuildCompleted.requires_target());
        assert!(!TaskType::PollingBuilds.requires_target());
        assert!(!TaskType::Manual.requires_target());
    }

    #[test]
    fn test_failure_result_detection() {
        assert!(TaskContext::for_target("b1").with_result("failed").is_failure_result());
        assert!(TaskContext::for_target("b1").with_result("Failed").is_failure_result());
        assert!(!TaskContext::for_target("b1").with_result("succeeded").is_failure_result());
        assert!(!TaskContext::for_target("b1").is_failure_result());
        assert!(!TaskContext::for_target("b1").with_result("canceled").is_failure_result());
        assert!(!TaskContext::for_target("b1").with_result("partiallySucceeded").is_failure_result());
    }

    #[test]
    fn test_escalation_category() {
        let failed = Task::new(
            TaskType::BuildCompleted,
            Priority::High,
            TaskContext::for_target("b1").with_result("failed"),
        );
        assert_eq!(failed.escalation_category(), "build_failure");

        let item = Task::new(TaskType::ItemUpdated, Priority::Medium, TaskContext::for_target("42"));
        assert_eq!(item.escalation_category(), "item_updated");
    }

    #[test]
    fn test_lifecycle_marks() {
        let mut task = Task::new(TaskType::ItemCreated, Priority::Medium, TaskContext::for_target("7"));
        task.mark_queued();
        assert!(task.timestamps.queued_at.is_some());
        task.mark_processing();
        assert_eq!(task.status, TaskStatus::Processing);
        task.finish(TaskStatus::Failed, Some("boom".to_string()));
        assert!(task.status.is_terminal());
        assert_eq!(task.error.as_deref(), Some("boom"));
        assert!(task.timestamps.completed_at.is_some());
    }
}
