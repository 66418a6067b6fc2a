//! Simulated integrations.
//!
//! Every catalog tool gets a handler that answers with canned data shaped like
//! the real tracker, CI and chat responses. Notifications are recorded in the
//! in-memory history so suppression and escalation behave as they would live.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use herald_orchestrator::collaborators::NotificationRecord;
use herald_orchestrator::tools::catalog::{
    FETCH_BUILD, FETCH_BUILD_LOGS, FETCH_BUILD_TIMELINE, FETCH_PULL_REQUEST, FETCH_WORK_ITEM, QUERY_BUILDS,
    QUERY_PULL_REQUESTS, QUERY_WORK_ITEMS, SEND_ESCALATION, SEND_NOTIFICATION, SUMMARIZE_BUILD_FAILURE,
    SUMMARIZE_STATE_CHANGE, standard_descriptors,
};
use herald_orchestrator::tools::{ToolArguments, handler_fn};
use herald_orchestrator::{HeraldError, MemoryNotificationHistory, ToolRegistry};
use serde_json::{Value, json};
use tracing::{debug, info};

/// Builds a registry of simulated tools. Tools named in `failing` always fail.
pub fn simulated_registry(history: &Arc<MemoryNotificationHistory>, failing: &[String]) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for descriptor in standard_descriptors() {
        let name = descriptor.name.clone();
        let fails = failing.contains(&name);
        let history = Arc::clone(history);
        let handler = handler_fn(move |args| {
            let name = name.clone();
            let history = Arc::clone(&history);
            async move {
                if fails {
                    return Err(HeraldError::ToolExecutionFailed(format!("{name}: simulated outage")));
                }
                if name == SEND_NOTIFICATION || name == SEND_ESCALATION {
                    let target = args.get_string("target_id").unwrap_or_default();
                    let category = args.get_string("category").unwrap_or_default();
                    history.record(&target, &category, format!("{name} about {target}")).await;
                    info!(tool = %name, target = %target, category = %category, "Notification sent");
                }
                Ok(respond(&name, &args))
            }
        });
        registry.register_descriptor(descriptor.with_handler(handler))?;
    }

    for tool in failing {
        if !registry.contains(tool) {
            anyhow::bail!("cannot simulate failure of unknown tool '{tool}'");
        }
    }
    Ok(registry)
}

fn respond(name: &str, args: &ToolArguments) -> Value {
    let arg = |key: &str| args.get_string(key).unwrap_or_default();
    match name {
        FETCH_WORK_ITEM => json!({
            "id": arg("item_id"),
            "title": format!("Work item {}", arg("item_id")),
            "state": "Active",
        }),
        FETCH_BUILD => json!({
            "id": arg("build_id"),
            "definition": "ci",
            "result": "failed",
        }),
        FETCH_BUILD_TIMELINE => json!({
            "build_id": arg("build_id"),
            "stages": [
                {"name": "restore", "result": "succeeded"},
                {"name": "compile", "result": "succeeded"},
                {"name": "test", "result": "failed"},
            ],
        }),
        FETCH_BUILD_LOGS => json!({
            "build_id": arg("build_id"),
            "lines": ["running 214 tests", "test store::tests::test_flush ... FAILED"],
        }),
        FETCH_PULL_REQUEST => json!({
            "id": arg("pr_id"),
            "title": format!("Pull request {}", arg("pr_id")),
            "status": "active",
        }),
        QUERY_WORK_ITEMS | QUERY_BUILDS | QUERY_PULL_REQUESTS => json!({
            "since": args.get_string("since"),
            "items": [],
        }),
        SUMMARIZE_BUILD_FAILURE => {
            let inputs = args.get_object("upstream").map_or(0, |u| u.values().filter(|v| !v.is_null()).count());
            json!({
                "summary": format!("Build {} failed in stage 'test'", arg("build_id")),
                "inputs": inputs,
            })
        }
        SUMMARIZE_STATE_CHANGE => json!({
            "summary": format!("Item {} moved from {} to {}", arg("item_id"), arg("from"), arg("to")),
        }),
        SEND_NOTIFICATION => json!({
            "delivered": true,
            "target_id": arg("target_id"),
            "category": arg("category"),
        }),
        SEND_ESCALATION => json!({
            "delivered": true,
            "target_id": arg("target_id"),
            "category": arg("category"),
            "failure_count": args.get_i64("failure_count").unwrap_or_default(),
        }),
        other => {
            debug!(tool = other, "No canned response");
            json!({})
        }
    }
}

/// Loads notification history from a JSON array of records.
pub async fn load_history(path: Option<&Path>) -> Result<Arc<MemoryNotificationHistory>> {
    let history = Arc::new(MemoryNotificationHistory::new());
    let Some(path) = path else {
        return Ok(history);
    };

    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read notification history {}", path.display()))?;
    let records: Vec<NotificationRecord> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid notification history in {}", path.display()))?;
    for record in &records {
        history.record_at(&record.target_id, &record.category, record.message.clone(), record.sent_at).await;
    }
    debug!(records = records.len(), "Seeded notification history");
    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_registry_covers_catalog() {
        let history = Arc::new(MemoryNotificationHistory::new());
        let registry = simulated_registry(&history, &[]).unwrap();
        assert_eq!(registry.len(), herald_orchestrator::tools::catalog::ALL_TOOLS.len());

        let envelope = registry
            .invoke(SEND_NOTIFICATION, json!({"target_id": "42", "category": "item_updated", "task_type": "item_updated"}))
            .await
            .unwrap();
        assert!(envelope.success);
        assert_eq!(history.records_for("42").await.len(), 1);

        let envelope = registry
            .invoke(SEND_ESCALATION, json!({"target_id": "982", "category": "build_failure", "failure_count": 4}))
            .await
            .unwrap();
        assert_eq!(envelope.result.unwrap()["failure_count"], json!(4));
    }

    #[tokio::test]
    async fn test_failing_tools() {
        let history = Arc::new(MemoryNotificationHistory::new());
        let registry = simulated_registry(&history, &[FETCH_BUILD.to_string()]).unwrap();
        let envelope = registry.invoke(FETCH_BUILD, json!({"build_id": "7"})).await.unwrap();
        assert!(!envelope.success);

        assert!(simulated_registry(&history, &["deploy".to_string()]).is_err());
    }

    #[tokio::test]
    async fn test_load_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(
            &path,
            r#"[{"target_id": "982", "category": "build_failure", "message": "failed", "sent_at": "2026-03-01T10:00:00Z"}]"#,
        )
        .unwrap();

        let history = load_history(Some(&path)).await.unwrap();
        assert_eq!(history.records_for("982").await.len(), 1);
        assert!(load_history(None).await.unwrap().is_empty().await);
        assert!(load_history(Some(&dir.path().join("missing.json"))).await.is_err());
    }
}
