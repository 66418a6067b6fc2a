//! Rule-based event classifier.
//!
//! Maps tracker and CI events to tasks, derives their priority from the
//! payload and decides which tasks duplicate work that is already queued or
//! running.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::collaborators::{Classifier, Relationships, Validation};
use crate::task::{Priority, Task, TaskContext, TaskType};

/// Payload fields consumed into dedicated context slots.
const RESERVED_FIELDS: [&str; 7] = ["id", "previous_state", "state", "result", "severity", "priority", "timestamp"];

/// Default [`Classifier`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl DefaultClassifier {
    /// Creates the classifier.
    pub fn new() -> Self {
        Self
    }

    /// Task type for an event type. Accepts dotted event names and task type names.
    pub fn task_type_for(event_type: &str) -> Option<TaskType> {
        let task_type = match event_type {
            "item.created" => TaskType::ItemCreated,
            "item.updated" => TaskType::ItemUpdated,
            "build.completed" => TaskType::BuildCompleted,
            "pr.created" => TaskType::PrCreated,
            "pr.updated" => TaskType::PrUpdated,
            "poll.items" => TaskType::PollingItems,
            "poll.builds" => TaskType::PollingBuilds,
            "poll.pull_requests" => TaskType::PollingPullRequests,
            "manual" => TaskType::Manual,
            other => return other.parse().ok(),
        };
        Some(task_type)
    }

    fn priority_for(task_type: TaskType, context: &TaskContext, payload: &Value) -> Priority {
        let severity = scalar(payload, "severity").map(|s| s.to_ascii_lowercase());
        if severity.as_deref() == Some("critical") {
            return Priority::Critical;
        }
        match task_type {
            TaskType::Manual => scalar(payload, "priority").and_then(|p| p.parse().ok()).unwrap_or(Priority::High),
            TaskType::BuildCompleted if context.is_failure_result() => Priority::High,
            TaskType::BuildCompleted => Priority::Low,
            t if t.is_polling() => Priority::Low,
            _ => Priority::Medium,
        }
    }
}

/// String form of a scalar payload field.
fn scalar(payload: &Value, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn context_from(payload: &Value) -> TaskContext {
    let mut context = TaskContext {
        target_id: scalar(payload, "id").filter(|id| !id.trim().is_empty()),
        previous_state: scalar(payload, "previous_state"),
        new_state: scalar(payload, "state"),
        result: scalar(payload, "result"),
        ..TaskContext::default()
    };
    if let Value::Object(fields) = payload {
        for key in fields.keys().filter(|k| !RESERVED_FIELDS.contains(&k.as_str())) {
            if let Some(value) = scalar(payload, key) {
                context.extra.insert(key.clone(), value);
            }
        }
    }
    context
}

fn same_ignoring_case(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        (None, None) => true,
        _ => false,
    }
}

impl Classifier for DefaultClassifier {
    fn interpret_event(&self, event_type: &str, payload: &Value) -> Option<Task> {
        let Some(task_type) = Self::task_type_for(event_type) else {
            debug!(event_type, "Ignoring unknown event type");
            return None;
        };
        if !payload.is_object() && !payload.is_null() {
            debug!(event_type, "Ignoring event with non-object payload");
            return None;
        }

        let context = context_from(payload);
        let priority = Self::priority_for(task_type, &context, payload);
        let mut task = Task::new(task_type, priority, context).with_payload(payload.clone());

        if let Some(at) = scalar(payload, "timestamp").and_then(|ts| DateTime::parse_from_rfc3339(&ts).ok()) {
            task = task.with_event_time(at.with_timezone(&Utc));
        }
        Some(task)
    }

    fn validate_task(&self, task: &Task) -> Validation {
        if task.id.trim().is_empty() {
            return Validation::invalid("task has no id");
        }
        if task.task_type.requires_target() && task.context.target_id.as_deref().is_none_or(|t| t.trim().is_empty()) {
            return Validation::invalid(format!("{} task has no target id", task.task_type));
        }
        Validation::ok()
    }

    fn analyze_relationships(&self, task: &Task, candidates: &[&Task]) -> Relationships {
        if task.task_type == TaskType::Manual {
            return Relationships::default();
        }
        let duplicates = candidates
            .iter()
            .filter(|c| c.id != task.id)
            .filter(|c| c.task_type == task.task_type)
            .filter(|c| c.context.target_id == task.context.target_id)
            .filter(|c| same_ignoring_case(c.context.new_state.as_deref(), task.context.new_state.as_deref()))
            .filter(|c| same_ignoring_case(c.context.result.as_deref(), task.context.result.as_deref()))
            .map(|c| c.id.clone())
            .collect();
        Relationships { duplicates }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_interprets_failed_build() {
        let task = DefaultClassifier
            .interpret_event(
                "build.completed",
                &json!({"id": 982, "result": "failed", "definition": "nightly", "timestamp": "2026-03-01T10:00:00Z"}),
            )
            .unwrap();

        assert_eq!(task.task_type, TaskType::BuildCompleted);
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.target(), "982");
        assert_eq!(task.context.result.as_deref(), Some("failed"));
        assert_eq!(task.context.extra.get("definition").map(String::as_str), Some("nightly"));
        assert_eq!(task.timestamps.event_at.to_rfc3339(), "2026-03-01T10:00:00+00:00");
    }

    #[test]
    fn test_priorities() {
        let classify = |event: &str, payload: Value| DefaultClassifier.interpret_event(event, &payload).unwrap().priority;

        assert_eq!(classify("build.completed", json!({"id": "1", "result": "succeeded"})), Priority::Low);
        assert_eq!(classify("item.updated", json!({"id": "1", "severity": "Critical"})), Priority::Critical);
        assert_eq!(classify("item.updated", json!({"id": "1"})), Priority::Medium);
        assert_eq!(classify("poll.builds", json!({})), Priority::Low);
        assert_eq!(classify("manual", json!({})), Priority::High);
        assert_eq!(classify("manual", json!({"priority": "low"})), Priority::Low);
    }

    #[test]
    fn test_unknown_events_are_ignored() {
        assert!(DefaultClassifier.interpret_event("item.deleted", &json!({"id": "1"})).is_none());
        assert!(DefaultClassifier.interpret_event("item.created", &json!("just a string")).is_none());
        assert!(DefaultClassifier.interpret_event("item_created", &json!({"id": "1"})).is_some());
    }

    #[test]
    fn test_validation_requires_target_for_single_target_events() {
        let classifier = DefaultClassifier;
        let missing = classifier.interpret_event("item.updated", &json!({"state": "Active"})).unwrap();
        assert!(!classifier.validate_task(&missing).valid);

        let polling = classifier.interpret_event("poll.items", &json!({})).unwrap();
        assert!(classifier.validate_task(&polling).valid);

        let mut blank_id = classifier.interpret_event("manual", &json!({})).unwrap();
        blank_id.id = " ".to_string();
        assert_eq!(classifier.validate_task(&blank_id).error.as_deref(), Some("task has no id"));
    }

    #[test]
    fn test_duplicates_match_type_target_and_transition() {
        let classifier = DefaultClassifier;
        let event = json!({"id": "42", "previous_state": "New", "state": "Active"});
        let first = classifier.interpret_event("item.updated", &event).unwrap();
        let second = classifier.interpret_event("item.updated", &event).unwrap();
        let other_state =
            classifier.interpret_event("item.updated", &json!({"id": "42", "state": "Resolved"})).unwrap();
        let other_target = classifier.interpret_event("item.updated", &json!({"id": "43", "state": "Active"})).unwrap();

        let relationships = classifier.analyze_relationships(&second, &[&first, &other_state, &other_target]);
        assert_eq!(relationships.duplicates, vec![first.id.clone()]);
        assert!(classifier.analyze_relationships(&first, &[&first]).duplicates.is_empty());
    }

    #[test]
    fn test_manual_tasks_never_duplicate() {
        let classifier = DefaultClassifier;
        let a = classifier.interpret_event("manual", &json!({})).unwrap();
        let b = classifier.interpret_event("manual", &json!({})).unwrap();
        assert!(!classifier.analyze_relationships(&b, &[&a]).is_duplicate());
    }
}
