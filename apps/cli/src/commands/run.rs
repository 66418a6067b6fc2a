//! Run command: replay an event file through the orchestrator.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use herald_orchestrator::{
    Collaborators, EnqueueOutcome, HeraldConfig, HeraldError, Orchestrator, OrchestratorStatus, Task, TaskStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::integrations::{load_history, simulated_registry};

/// One line of an event file.
#[derive(Debug, Clone, Deserialize)]
pub struct EventLine {
    /// Event type (`build.completed`, `item.updated`, ...)
    #[serde(rename = "type", alias = "event_type")]
    pub event_type: String,
    /// Event body
    #[serde(default)]
    pub payload: Value,
}

/// What happened to the events of a file.
#[derive(Debug, Default, Clone, Serialize)]
pub struct IngestSummary {
    pub queued: usize,
    pub duplicates: usize,
    pub ignored: usize,
    pub rejected: usize,
}

#[derive(Serialize)]
struct RunReport<'a> {
    events: &'a IngestSummary,
    status: &'a OrchestratorStatus,
    tasks: &'a [Task],
}

/// Parses a JSON Lines event file. Blank lines and `#` comments are skipped.
pub fn parse_events(content: &str) -> Result<Vec<EventLine>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
        .map(|(n, line)| serde_json::from_str(line).with_context(|| format!("Invalid event on line {}", n + 1)))
        .collect()
}

/// Execute the run command
pub async fn execute(
    config: HeraldConfig,
    events: &Path,
    history: Option<&Path>,
    fail_tools: &[String],
    json: bool,
) -> Result<()> {
    let content = tokio::fs::read_to_string(events)
        .await
        .with_context(|| format!("Failed to read event file {}", events.display()))?;
    let events = parse_events(&content)?;

    let history = load_history(history).await?;
    let registry = Arc::new(simulated_registry(&history, fail_tools)?);
    let orchestrator = Orchestrator::new(&config, registry, Collaborators::in_memory(history))?;
    orchestrator.start().await?;

    let mut summary = IngestSummary::default();
    for event in &events {
        match orchestrator.ingest(&event.event_type, &event.payload).await {
            Ok(Some(EnqueueOutcome::Queued { .. })) => summary.queued += 1,
            Ok(Some(EnqueueOutcome::Duplicate { .. })) => summary.duplicates += 1,
            Ok(None) => summary.ignored += 1,
            Err(HeraldError::Validation(reason)) => {
                warn!(event_type = %event.event_type, %reason, "Rejected event");
                summary.rejected += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
    info!(events = events.len(), queued = summary.queued, "Events ingested");

    orchestrator.wait_idle().await;
    let status = orchestrator.status().await;
    let tasks = orchestrator.history().await;
    orchestrator.shutdown().await;

    if json {
        let report = RunReport { events: &summary, status: &status, tasks: &tasks };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&summary, &status, &tasks);
    }
    Ok(())
}

fn print_report(summary: &IngestSummary, status: &OrchestratorStatus, tasks: &[Task]) {
    println!("{}", "Herald Run".bold().cyan());
    println!("{}", "─".repeat(60).dimmed());
    println!(
        "  Events: {} queued, {} duplicate, {} ignored, {} rejected",
        summary.queued, summary.duplicates, summary.ignored, summary.rejected
    );
    println!();

    for task in tasks {
        let status_label = match task.status {
            TaskStatus::Completed => "completed".green(),
            TaskStatus::Partial => "partial".yellow(),
            TaskStatus::Failed => "failed".red(),
            other => other.to_string().normal(),
        };
        println!("{} {} [{}] {}", status_label.bold(), task.task_type, task.priority, task.target().dimmed());
        if let Some(execution) = &task.execution {
            for step in &execution.steps {
                let detail = step.error.as_deref().unwrap_or("");
                println!("    {:<26} {:<10} {}", step.tool, step.status.to_string(), detail.dimmed());
            }
        }
        if let Some(error) = &task.error {
            println!("    {}", error.red());
        }
    }

    println!();
    println!(
        "{}",
        format!(
            "Completed: {}  Partial: {}  Failed: {}  Duplicates dropped: {}  Peak concurrency: {}/{}",
            status.completed,
            status.partial,
            status.failed,
            status.duplicates_dropped,
            status.peak_active,
            status.max_concurrent_tasks
        )
        .dimmed()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_events() {
        let content = r#"
# nightly failures
{"type": "build.completed", "payload": {"id": 982, "result": "failed"}}

{"event_type": "poll.items"}
"#;
        let events = parse_events(content).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "build.completed");
        assert_eq!(events[1].event_type, "poll.items");
        assert!(events[1].payload.is_null());
    }

    #[test]
    fn test_parse_events_reports_line() {
        let err = parse_events("{\"type\": \"manual\"}\nnot json\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
