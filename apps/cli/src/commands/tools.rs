//! Tools command: list the registered tools.

use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use herald_orchestrator::MemoryNotificationHistory;
use herald_orchestrator::tools::{ToolDescriptor, ToolParameters};
use serde_json::{Value, json};

use crate::integrations::simulated_registry;

/// Execute the tools list command
pub fn list(category: Option<&str>, json: bool) -> Result<()> {
    let registry = simulated_registry(&Arc::new(MemoryNotificationHistory::new()), &[])?;
    let tools: Vec<&ToolDescriptor> = registry
        .descriptors()
        .filter(|t| category.is_none_or(|c| t.category.to_string().eq_ignore_ascii_case(c)))
        .collect();

    if json {
        let tools_json: Vec<Value> = tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "category": tool.category,
                    "parameters": serialize_parameters(&tool.parameters),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&tools_json)?);
        return Ok(());
    }

    println!("{}", "Available Tools".bold().cyan());
    println!("{}", "─".repeat(60).dimmed());
    println!();

    if tools.is_empty() {
        println!("{}", "No tools found".yellow());
        return Ok(());
    }

    for tool in &tools {
        println!("{} {}", tool.name.bold().green(), format!("({})", tool.category).dimmed());
        println!("  {}", tool.description.dimmed());
        for (name, prop) in &tool.parameters.properties {
            let required = if tool.parameters.required.contains(name) { "required" } else { "optional" };
            println!(
                "    {} ({}, {}) - {}",
                name.cyan(),
                prop.property_type,
                required,
                prop.description.dimmed()
            );
        }
        println!();
    }
    println!("{}", format!("Total: {} tool(s)", tools.len()).dimmed());
    Ok(())
}

/// Serialize tool parameters to JSON
fn serialize_parameters(params: &ToolParameters) -> Value {
    let properties: serde_json::Map<String, Value> = params
        .properties
        .iter()
        .map(|(name, prop)| {
            (
                name.clone(),
                json!({
                    "type": prop.property_type,
                    "description": prop.description,
                    "required": params.required.contains(name),
                }),
            )
        })
        .collect();
    Value::Object(properties)
}
