//! Plan model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

use crate::tools::ToolCategory;

/// Lifecycle of a single step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not started.
    #[default]
    Pending,
    /// Invocation in flight.
    Running,
    /// Tool reported success.
    Completed,
    /// Tool reported failure, timed out or was not found.
    Failed,
    /// Not invoked.
    Skipped,
}

impl StepStatus {
    /// Whether dependents may stop waiting on this step.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Qualitative risk tag. Diagnostic only; never blocks execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    /// Many calls to the external tracker.
    ManyExternalCalls,
    /// Estimated duration above the threshold.
    LongRunning,
    /// Depends on the text-generation service.
    UsesSummarization,
    /// Sends more notifications than usual.
    ManyNotifications,
}

impl fmt::Display for RiskFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ManyExternalCalls => "many_external_calls",
            Self::LongRunning => "long_running",
            Self::UsesSummarization => "uses_summarization",
            Self::ManyNotifications => "many_notifications",
        };
        f.write_str(s)
    }
}

/// One planned tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Unique within the plan (`step_1`, `step_2`, ...).
    pub id: String,
    /// Tool to invoke.
    pub tool: String,
    /// Category of the tool, as registered.
    pub category: ToolCategory,
    /// Why the step is in the plan.
    pub reason: String,
    /// Resolved parameters.
    pub parameters: Value,
    /// Lifecycle state.
    pub status: StepStatus,
    /// Steps that must be terminal before this one starts.
    pub depends_on: Vec<String>,
    /// Estimated duration in milliseconds.
    pub estimated_ms: u64,
    /// Skipped at execution time instead of invoked.
    pub conditional: bool,
    /// Why the step is conditional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl PlanStep {
    /// Whether the step has no dependencies and reads from the external tracker.
    pub fn is_root_fetch(&self) -> bool {
        self.depends_on.is_empty() && self.category.is_external()
    }
}

/// Ordered, dependency-annotated steps for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Task the plan was built for.
    pub task_id: String,
    /// Steps in build order. Dependencies only point backwards.
    pub steps: Vec<PlanStep>,
    /// Builder narration, in order.
    pub reasoning: Vec<String>,
    /// Sum of step estimates in milliseconds.
    pub estimated_ms: u64,
    /// Risk tags.
    pub risk_factors: BTreeSet<RiskFactor>,
    /// When the plan was built.
    pub created_at: DateTime<Utc>,
}

impl ExecutionPlan {
    /// Looks up a step by id.
    pub fn step(&self, id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// First step invoking `tool`.
    pub fn step_for_tool(&self, tool: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.tool == tool)
    }

    /// Tool names in step order.
    pub fn tools(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.tool.as_str()).collect()
    }

    /// Tool and dependency ids of every step; equal for structurally identical plans.
    pub fn shape(&self) -> Vec<(String, Vec<String>)> {
        self.steps.iter().map(|s| (s.tool.clone(), s.depends_on.clone())).collect()
    }

    /// Whether `step_id` depends on `ancestor`, directly or through other steps.
    pub fn depends_transitively(&self, step_id: &str, ancestor: &str) -> bool {
        let mut pending = vec![step_id];
        let mut seen = BTreeSet::new();
        while let Some(id) = pending.pop() {
            let Some(step) = self.step(id) else { continue };
            for dep in &step.depends_on {
                if dep == ancestor {
                    return true;
                }
                if seen.insert(dep.as_str()) {
                    pending.push(dep);
                }
            }
        }
        false
    }

    /// Whether the plan has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
