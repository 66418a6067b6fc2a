//! Tool registry.
//!
//! Holds the tool descriptors registered at startup and executes them
//! uniformly: schema check, timing, and a [`ToolEnvelope`] whether the
//! handler succeeded or not. Usage counters feed the status surface.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::tool::{ToolArguments, ToolCategory, ToolDescriptor, ToolEnvelope, ToolHandler};
use crate::error::{HeraldError, Result};

/// Invocation counters for one tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ToolUsage {
    /// Number of invocations.
    pub invocations: u64,
    /// Invocations whose handler failed.
    pub failures: u64,
    /// Accumulated wall-clock time in milliseconds.
    pub total_duration_ms: u64,
}

/// Registry statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolStats {
    /// Number of registered tools.
    pub total_tools: usize,
    /// Registered tools per category.
    pub by_category: BTreeMap<ToolCategory, usize>,
    /// Usage per tool name.
    pub usage: BTreeMap<String, ToolUsage>,
}

/// Registry of named tools.
///
/// Registration happens through `&mut self` before the registry is shared;
/// afterwards it is only read, apart from the usage counters.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolDescriptor>,
    usage: Mutex<BTreeMap<String, ToolUsage>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor under `name`.
    ///
    /// # Errors
    /// Fails if the descriptor has no name, description or handler, if `name`
    /// differs from the descriptor's name, or if the name is already taken.
    pub fn register(&mut self, name: &str, descriptor: ToolDescriptor) -> Result<()> {
        let invalid = |reason: &str| HeraldError::InvalidTool { name: name.to_string(), reason: reason.to_string() };

        if descriptor.name.trim().is_empty() {
            return Err(invalid("descriptor has no name"));
        }
        if descriptor.name != name {
            return Err(invalid(&format!("descriptor is named '{}'", descriptor.name)));
        }
        if descriptor.description.trim().is_empty() {
            return Err(invalid("descriptor has no description"));
        }
        if descriptor.handler.is_none() {
            return Err(invalid("descriptor has no handler"));
        }
        if self.tools.contains_key(name) {
            return Err(HeraldError::DuplicateTool(name.to_string()));
        }

        debug!(tool = %name, category = %descriptor.category, "Registered tool");
        self.tools.insert(name.to_string(), descriptor);
        Ok(())
    }

    /// Registers a descriptor under its own name.
    pub fn register_descriptor(&mut self, descriptor: ToolDescriptor) -> Result<()> {
        let name = descriptor.name.clone();
        self.register(&name, descriptor)
    }

    /// Looks up a descriptor.
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// Whether a tool is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Category of a registered tool.
    pub fn category_of(&self, name: &str) -> Option<ToolCategory> {
        self.tools.get(name).map(|d| d.category)
    }

    /// Registered descriptors, ordered by name.
    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.values()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invokes a tool.
    ///
    /// Schema problems are reported in the envelope but do not prevent the
    /// call. A failing handler yields `success: false`, not an error.
    ///
    /// # Errors
    /// Returns [`HeraldError::ToolNotFound`] if `name` is not registered.
    pub async fn invoke(&self, name: &str, parameters: Value) -> Result<ToolEnvelope> {
        let descriptor = self.tools.get(name).ok_or_else(|| HeraldError::ToolNotFound(name.to_string()))?;
        let handler: Arc<dyn ToolHandler> = descriptor
            .handler
            .clone()
            .ok_or_else(|| HeraldError::InvalidTool { name: name.to_string(), reason: "descriptor has no handler".to_string() })?;

        let validation_warnings = descriptor.parameters.validate(&parameters);
        if !validation_warnings.is_empty() {
            warn!(tool = %name, problems = ?validation_warnings, "Tool parameters do not match schema");
        }

        let args = ToolArguments::new(parameters);
        let start = Instant::now();
        let outcome = handler.execute(&args).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let envelope = match outcome {
            Ok(result) => ToolEnvelope {
                tool: name.to_string(),
                success: true,
                result: Some(result),
                error: None,
                duration_ms,
                timestamp: Utc::now(),
                validation_warnings,
            },
            Err(e) => {
                debug!(tool = %name, error = %e, "Tool invocation failed");
                ToolEnvelope {
                    tool: name.to_string(),
                    success: false,
                    result: None,
                    error: Some(e.to_string()),
                    duration_ms,
                    timestamp: Utc::now(),
                    validation_warnings,
                }
            }
        };

        self.record(name, &envelope).await;
        Ok(envelope)
    }

    async fn record(&self, name: &str, envelope: &ToolEnvelope) {
        let mut usage = self.usage.lock().await;
        let entry = usage.entry(name.to_string()).or_default();
        entry.invocations += 1;
        entry.total_duration_ms += envelope.duration_ms;
        if !envelope.success {
            entry.failures += 1;
        }
    }

    /// Returns registry statistics.
    pub async fn stats(&self) -> ToolStats {
        let mut by_category = BTreeMap::new();
        for descriptor in self.tools.values() {
            *by_category.entry(descriptor.category).or_insert(0) += 1;
        }
        ToolStats { total_tools: self.tools.len(), by_category, usage: self.usage.lock().await.clone() }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").field("tools", &self.tools.keys().collect::<Vec<_>>()).finish_non_exhaustive()
    }
}
