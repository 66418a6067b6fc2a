//! Parameter resolvers.
//!
//! Each tool a plan may contain has a pure function from the task to the
//! tool's parameters. The table is checked against the plan templates when
//! the builder is constructed.

use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::fmt;

use crate::task::Task;
use crate::tools::catalog::{
    FETCH_BUILD, FETCH_BUILD_LOGS, FETCH_BUILD_TIMELINE, FETCH_PULL_REQUEST, FETCH_WORK_ITEM, QUERY_BUILDS,
    QUERY_PULL_REQUESTS, QUERY_WORK_ITEMS, SEND_ESCALATION, SEND_NOTIFICATION, SUMMARIZE_BUILD_FAILURE,
    SUMMARIZE_STATE_CHANGE,
};

/// Pure mapping from a task to one tool's parameters.
pub type ParamResolver = fn(&Task) -> Map<String, Value>;

/// Table of resolvers keyed by tool name.
#[derive(Clone, Default)]
pub struct ParamResolvers {
    resolvers: HashMap<String, ParamResolver>,
}

impl fmt::Debug for ParamResolvers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tools: Vec<_> = self.resolvers.keys().collect();
        tools.sort();
        f.debug_struct("ParamResolvers").field("tools", &tools).finish()
    }
}

fn single(key: &str, value: &str) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(key.to_string(), Value::String(value.to_string()));
    map
}

fn item_id(task: &Task) -> Map<String, Value> {
    single("item_id", task.target())
}

fn build_id(task: &Task) -> Map<String, Value> {
    single("build_id", task.target())
}

fn pr_id(task: &Task) -> Map<String, Value> {
    single("pr_id", task.target())
}

fn since(task: &Task) -> Map<String, Value> {
    task.context.extra.get("since").map(|s| single("since", s)).unwrap_or_default()
}

fn state_change(task: &Task) -> Map<String, Value> {
    let mut map = item_id(task);
    map.insert("from".to_string(), json!(task.context.previous_state.as_deref().unwrap_or_default()));
    map.insert("to".to_string(), json!(task.context.new_state.as_deref().unwrap_or_default()));
    map
}

fn notification(task: &Task) -> Map<String, Value> {
    let mut map = single("target_id", task.target());
    map.insert("category".to_string(), json!(task.escalation_category()));
    map.insert("task_type".to_string(), json!(task.task_type.as_str()));
    map
}

fn escalation(task: &Task) -> Map<String, Value> {
    let mut map = single("target_id", task.target());
    map.insert("category".to_string(), json!(task.escalation_category()));
    map
}

impl ParamResolvers {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolvers for every catalog tool.
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.insert(FETCH_WORK_ITEM, item_id);
        table.insert(FETCH_BUILD, build_id);
        table.insert(FETCH_BUILD_TIMELINE, build_id);
        table.insert(FETCH_BUILD_LOGS, build_id);
        table.insert(SUMMARIZE_BUILD_FAILURE, build_id);
        table.insert(FETCH_PULL_REQUEST, pr_id);
        table.insert(QUERY_WORK_ITEMS, since);
        table.insert(QUERY_BUILDS, since);
        table.insert(QUERY_PULL_REQUESTS, since);
        table.insert(SUMMARIZE_STATE_CHANGE, state_change);
        table.insert(SEND_NOTIFICATION, notification);
        table.insert(SEND_ESCALATION, escalation);
        table
    }

    /// Adds or replaces a resolver.
    pub fn insert(&mut self, tool: &str, resolver: ParamResolver) {
        self.resolvers.insert(tool.to_string(), resolver);
    }

    /// Removes a resolver.
    pub fn remove(&mut self, tool: &str) -> Option<ParamResolver> {
        self.resolvers.remove(tool)
    }

    /// Whether `tool` has a resolver.
    pub fn contains(&self, tool: &str) -> bool {
        self.resolvers.contains_key(tool)
    }

    /// Parameters for `tool`, or `None` when it has no resolver.
    pub fn resolve(&self, tool: &str, task: &Task) -> Option<Map<String, Value>> {
        self.resolvers.get(tool).map(|resolve| resolve(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Priority, TaskContext, TaskType};
    use crate::tools::catalog::ALL_TOOLS;

    #[test]
    fn test_standard_covers_catalog() {
        let table = ParamResolvers::standard();
        for tool in ALL_TOOLS {
            assert!(table.contains(tool), "missing resolver for {tool}");
        }
    }

    #[test]
    fn test_state_change_parameters() {
        let task = Task::new(
            TaskType::ItemUpdated,
            Priority::Medium,
            TaskContext::for_target("42").with_transition("New", "Active"),
        );
        let params = ParamResolvers::standard().resolve(SUMMARIZE_STATE_CHANGE, &task).unwrap();
        assert_eq!(Value::Object(params), json!({"item_id": "42", "from": "New", "to": "Active"}));
    }

    #[test]
    fn test_notification_parameters_carry_category() {
        let task = Task::new(
            TaskType::BuildCompleted,
            Priority::High,
            TaskContext::for_target("982").with_result("failed"),
        );
        let params = ParamResolvers::standard().resolve(SEND_NOTIFICATION, &task).unwrap();
        assert_eq!(
            Value::Object(params),
            json!({"target_id": "982", "category": "build_failure", "task_type": "build_completed"})
        );
    }

    #[test]
    fn test_query_since_is_optional() {
        let table = ParamResolvers::standard();
        let plain = Task::new(TaskType::PollingBuilds, Priority::Low, TaskContext::default());
        assert!(table.resolve(QUERY_BUILDS, &plain).unwrap().is_empty());

        let bounded = Task::new(
            TaskType::PollingBuilds,
            Priority::Low,
            TaskContext::default().with_extra("since", "2026-01-01T00:00:00Z"),
        );
        assert_eq!(table.resolve(QUERY_BUILDS, &bounded).unwrap()["since"], json!("2026-01-01T00:00:00Z"));
    }

    #[test]
    fn test_unknown_tool_has_no_resolver() {
        let task = Task::new(TaskType::Manual, Priority::High, TaskContext::default());
        assert!(ParamResolvers::standard().resolve("reboot_server", &task).is_none());
    }
}
