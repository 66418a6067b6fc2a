// Per-type plan templates, duration estimates and transition rules

use crate::task::TaskType;
use crate::tools::catalog::{
    FETCH_BUILD, FETCH_BUILD_LOGS, FETCH_BUILD_TIMELINE, FETCH_PULL_REQUEST, FETCH_WORK_ITEM, QUERY_BUILDS,
    QUERY_PULL_REQUESTS, QUERY_WORK_ITEMS, SEND_ESCALATION, SEND_NOTIFICATION, SUMMARIZE_BUILD_FAILURE,
    SUMMARIZE_STATE_CHANGE,
};

/// Estimate for tools missing from the table.
pub const DEFAULT_ESTIMATE_MS: u64 = 2000;

/// Transitions worth a summary, as (from, to) in lowercase.
const SIGNIFICANT_TRANSITIONS: [(&str, &str); 6] = [
    ("new", "active"),
    ("active", "resolved"),
    ("resolved", "closed"),
    ("active", "closed"),
    ("resolved", "active"),
    ("closed", "active"),
];

/// Steps every task of the type starts with, chained in order.
pub fn base_template(task_type: TaskType) -> &'static [&'static str] {
    match task_type {
        TaskType::ItemCreated | TaskType::ItemUpdated => &[FETCH_WORK_ITEM, SEND_NOTIFICATION],
        TaskType::BuildCompleted => &[FETCH_BUILD],
        TaskType::PrCreated | TaskType::PrUpdated => &[FETCH_PULL_REQUEST, SEND_NOTIFICATION],
        TaskType::PollingItems => &[QUERY_WORK_ITEMS],
        TaskType::PollingBuilds => &[QUERY_BUILDS],
        TaskType::PollingPullRequests => &[QUERY_PULL_REQUESTS],
        TaskType::Manual => &[],
    }
}

/// Tools that customisation and escalation may add on top of the templates.
pub const CUSTOMISATION_TOOLS: [&str; 6] = [
    FETCH_BUILD_TIMELINE,
    FETCH_BUILD_LOGS,
    SUMMARIZE_BUILD_FAILURE,
    SUMMARIZE_STATE_CHANGE,
    SEND_NOTIFICATION,
    SEND_ESCALATION,
];

/// Every tool a plan can contain, deduplicated, in first-use order.
pub fn required_tools() -> Vec<&'static str> {
    let mut tools: Vec<&'static str> = Vec::new();
    let all = TaskType::ALL.iter().flat_map(|t| base_template(*t).iter().copied()).chain(CUSTOMISATION_TOOLS);
    for tool in all {
        if !tools.contains(&tool) {
            tools.push(tool);
        }
    }
    tools
}

/// Estimated duration of one invocation in milliseconds.
pub fn estimated_duration_ms(tool: &str) -> u64 {
    match tool {
        FETCH_WORK_ITEM | FETCH_PULL_REQUEST => 1500,
        FETCH_BUILD => 2000,
        FETCH_BUILD_TIMELINE => 2500,
        FETCH_BUILD_LOGS => 4000,
        SUMMARIZE_BUILD_FAILURE => 6000,
        SUMMARIZE_STATE_CHANGE => 5000,
        SEND_NOTIFICATION | SEND_ESCALATION => 1000,
        QUERY_WORK_ITEMS | QUERY_BUILDS | QUERY_PULL_REQUESTS => 3000,
        _ => DEFAULT_ESTIMATE_MS,
    }
}

/// Whether a state transition deserves a summary. Case-insensitive.
pub fn is_significant_transition(from: &str, to: &str) -> bool {
    let from = from.trim().to_ascii_lowercase();
    let to = to.trim().to_ascii_lowercase();
    SIGNIFICANT_TRANSITIONS.iter().any(|(f, t)| *f == from && *t == to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_significant_transitions() {
        assert!(is_significant_transition("New", "Active"));
        assert!(is_significant_transition("closed", "active"));
        assert!(is_significant_transition("Resolved", "Active"));
        assert!(!is_significant_transition("active", "new"));
        assert!(!is_significant_transition("new", "closed"));
        assert!(!is_significant_transition("", ""));
    }

    #[test]
    fn test_manual_template_is_empty() {
        assert!(base_template(TaskType::Manual).is_empty());
    }

    #[test]
    fn test_required_tools_are_unique() {
        let tools = required_tools();
        let mut sorted = tools.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), tools.len());
        assert!(tools.contains(&SEND_ESCALATION));
        assert!(tools.contains(&QUERY_PULL_REQUESTS));
    }

    #[test]
    fn test_estimates() {
        assert_eq!(estimated_duration_ms(FETCH_BUILD_LOGS), 4000);
        assert_eq!(estimated_duration_ms("custom_tool"), DEFAULT_ESTIMATE_MS);
    }
}
