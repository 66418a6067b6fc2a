//! Plan command: dry-run the plan builder for one event.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use colored::Colorize;
use herald_orchestrator::{Classifier, DefaultClassifier, ExecutionPlan, HeraldConfig, PlanBuilder, Task};
use serde_json::Value;

use crate::integrations::{load_history, simulated_registry};

/// Execute the plan command
pub async fn execute(
    config: HeraldConfig,
    event_type: &str,
    payload: &str,
    history: Option<&Path>,
    json: bool,
) -> Result<()> {
    let payload: Value = serde_json::from_str(payload).context("Payload is not valid JSON")?;

    let classifier = DefaultClassifier::new();
    let task = classifier
        .interpret_event(event_type, &payload)
        .ok_or_else(|| anyhow!("Event type '{event_type}' does not produce a task"))?;
    let validation = classifier.validate_task(&task);
    if !validation.valid {
        bail!("Invalid task: {}", validation.error.unwrap_or_default());
    }

    let history = load_history(history).await?;
    let registry = Arc::new(simulated_registry(&history, &[])?);
    let builder = PlanBuilder::new(registry, history, config.planning)?;
    let plan = builder.build_plan(&task).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_plan(&task, &plan);
    }
    Ok(())
}

fn print_plan(task: &Task, plan: &ExecutionPlan) {
    println!("{}", format!("Plan for {} {}", task.task_type, task.target()).bold().cyan());
    println!("{}", "─".repeat(60).dimmed());

    if plan.is_empty() {
        println!("{}", "No steps".yellow());
    }
    for step in &plan.steps {
        let deps = if step.depends_on.is_empty() { String::new() } else { format!("after {}", step.depends_on.join(", ")) };
        println!("{} {} {}", step.id.bold(), step.tool.green(), deps.dimmed());
        println!("    {}", step.reason.dimmed());
        if let Some(skip) = &step.skip_reason {
            println!("    {}", format!("conditional: {skip}").yellow());
        }
    }

    println!();
    for line in &plan.reasoning {
        println!("  {}", line.dimmed());
    }
    if !plan.risk_factors.is_empty() {
        let risks: Vec<String> = plan.risk_factors.iter().map(ToString::to_string).collect();
        println!("  {}", format!("Risks: {}", risks.join(", ")).yellow());
    }
    println!("{}", format!("Estimated: {} ms", plan.estimated_ms).dimmed());
}
