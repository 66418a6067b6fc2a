// Standard tool catalog
//
// Single source of truth for the names, categories and schemas of the tools
// the plan templates use. Integrations supply the handlers.

use serde_json::json;

use super::tool::{ParamType, ToolCategory, ToolDescriptor, ToolParameters};

/// Fetch one work item by id.
pub const FETCH_WORK_ITEM: &str = "fetch_work_item";
/// Fetch one build by id.
pub const FETCH_BUILD: &str = "fetch_build";
/// Fetch the stage timeline of a build.
pub const FETCH_BUILD_TIMELINE: &str = "fetch_build_timeline";
/// Fetch the logs of a build.
pub const FETCH_BUILD_LOGS: &str = "fetch_build_logs";
/// Fetch one pull request by id.
pub const FETCH_PULL_REQUEST: &str = "fetch_pull_request";
/// List recently changed work items.
pub const QUERY_WORK_ITEMS: &str = "query_work_items";
/// List recently finished builds.
pub const QUERY_BUILDS: &str = "query_builds";
/// List recently changed pull requests.
pub const QUERY_PULL_REQUESTS: &str = "query_pull_requests";
/// Summarize why a build failed.
pub const SUMMARIZE_BUILD_FAILURE: &str = "summarize_build_failure";
/// Summarize a work item state transition.
pub const SUMMARIZE_STATE_CHANGE: &str = "summarize_state_change";
/// Send a notification about a target.
pub const SEND_NOTIFICATION: &str = "send_notification";
/// Send a high-priority escalation about a repeatedly failing target.
pub const SEND_ESCALATION: &str = "send_escalation";

/// Every tool name in the catalog.
pub const ALL_TOOLS: [&str; 12] = [
    FETCH_WORK_ITEM,
    FETCH_BUILD,
    FETCH_BUILD_TIMELINE,
    FETCH_BUILD_LOGS,
    FETCH_PULL_REQUEST,
    QUERY_WORK_ITEMS,
    QUERY_BUILDS,
    QUERY_PULL_REQUESTS,
    SUMMARIZE_BUILD_FAILURE,
    SUMMARIZE_STATE_CHANGE,
    SEND_NOTIFICATION,
    SEND_ESCALATION,
];

/// Category of a catalog tool, by name.
pub fn category_of(name: &str) -> ToolCategory {
    match name {
        FETCH_WORK_ITEM | FETCH_BUILD | FETCH_BUILD_TIMELINE | FETCH_BUILD_LOGS | FETCH_PULL_REQUEST
        | QUERY_WORK_ITEMS | QUERY_BUILDS | QUERY_PULL_REQUESTS => ToolCategory::Fetch,
        SUMMARIZE_BUILD_FAILURE | SUMMARIZE_STATE_CHANGE => ToolCategory::Summarize,
        SEND_NOTIFICATION | SEND_ESCALATION => ToolCategory::Notify,
        _ => ToolCategory::Other,
    }
}

/// Whether the tool sends a notification.
pub fn is_notification(name: &str) -> bool {
    category_of(name) == ToolCategory::Notify
}

/// Descriptors (without handlers) for every catalog tool.
pub fn standard_descriptors() -> Vec<ToolDescriptor> {
    let id = |key: &str, what: &str| ToolParameters::new().add_property(key, ParamType::String, what, true);
    let since = || {
        ToolParameters::new().add_property("since", ParamType::String, "RFC 3339 lower bound", false)
    };

    vec![
        ToolDescriptor::new(
            FETCH_WORK_ITEM,
            "Fetch a work item with its current fields",
            ToolCategory::Fetch,
            id("item_id", "Work item id"),
        )
        .with_example("Fetch item 4711", json!({"item_id": "4711"})),
        ToolDescriptor::new(FETCH_BUILD, "Fetch a build record", ToolCategory::Fetch, id("build_id", "Build id"))
            .with_example("Fetch build 982", json!({"build_id": "982"})),
        ToolDescriptor::new(
            FETCH_BUILD_TIMELINE,
            "Fetch the stage and job timeline of a build",
            ToolCategory::Fetch,
            id("build_id", "Build id"),
        ),
        ToolDescriptor::new(
            FETCH_BUILD_LOGS,
            "Fetch the log output of a build",
            ToolCategory::Fetch,
            id("build_id", "Build id"),
        ),
        ToolDescriptor::new(
            FETCH_PULL_REQUEST,
            "Fetch a pull request with reviewers and status",
            ToolCategory::Fetch,
            id("pr_id", "Pull request id"),
        ),
        ToolDescriptor::new(QUERY_WORK_ITEMS, "List recently changed work items", ToolCategory::Fetch, since()),
        ToolDescriptor::new(QUERY_BUILDS, "List recently finished builds", ToolCategory::Fetch, since()),
        ToolDescriptor::new(
            QUERY_PULL_REQUESTS,
            "List recently changed pull requests",
            ToolCategory::Fetch,
            since(),
        ),
        ToolDescriptor::new(
            SUMMARIZE_BUILD_FAILURE,
            "Summarize the likely cause of a build failure from its timeline and logs",
            ToolCategory::Summarize,
            id("build_id", "Build id"),
        ),
        ToolDescriptor::new(
            SUMMARIZE_STATE_CHANGE,
            "Summarize a significant work item state transition",
            ToolCategory::Summarize,
            id("item_id", "Work item id")
                .add_property("from", ParamType::String, "Previous state", true)
                .add_property("to", ParamType::String, "New state", true),
        ),
        ToolDescriptor::new(
            SEND_NOTIFICATION,
            "Send a notification about a target",
            ToolCategory::Notify,
            id("target_id", "Target the notification is about")
                .add_property("category", ParamType::String, "Notification category", true)
                .add_property("task_type", ParamType::String, "Originating task type", true),
        )
        .with_example(
            "Notify about a failed build",
            json!({"target_id": "982", "category": "build_failure", "task_type": "build_completed"}),
        ),
        ToolDescriptor::new(
            SEND_ESCALATION,
            "Send a high-priority escalation about a repeatedly failing target",
            ToolCategory::Notify,
            id("target_id", "Target being escalated")
                .add_property("category", ParamType::String, "Failure category", true)
                .add_property("failure_count", ParamType::Integer, "Failures inside the window", true),
        ),
    ]
}
