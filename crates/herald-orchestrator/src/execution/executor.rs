//! Plan executor.
//!
//! Walks the step graph as it completes: a pending step starts as soon as
//! every dependency is terminal, alongside whatever is still in flight. A
//! dependency means "wait for", not "require success"; failed or skipped
//! dependencies reach their dependents as `null` in the `upstream` argument.

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ExecutionConfig;
use crate::error::{HeraldError, Result};
use crate::planning::{ExecutionPlan, PlanStep, RiskFactor, StepStatus};
use crate::tools::ToolRegistry;

/// Terminal status of a plan execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Every non-skipped step succeeded.
    Completed,
    /// Some steps succeeded, some failed.
    Partial,
    /// A root fetch failed, nothing succeeded, or the run was cancelled.
    Failed,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What happened to one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Step id within the plan.
    pub step_id: String,
    /// Tool the step targets.
    pub tool: String,
    /// Terminal status.
    pub status: StepStatus,
    /// Whether the tool reported success.
    pub success: bool,
    /// Tool output on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error on failure, or why the step was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl StepOutcome {
    fn skipped(step: &PlanStep, reason: impl Into<String>) -> Self {
        Self {
            step_id: step.id.clone(),
            tool: step.tool.clone(),
            status: StepStatus::Skipped,
            success: false,
            result: None,
            error: Some(reason.into()),
            duration_ms: 0,
        }
    }

    fn failed(step: &PlanStep, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            step_id: step.id.clone(),
            tool: step.tool.clone(),
            status: StepStatus::Failed,
            success: false,
            result: None,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

/// Aggregate counters for one execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    /// Total wall-clock time in milliseconds.
    pub duration_ms: u64,
    /// Steps in the plan.
    pub total_steps: usize,
    /// Steps that succeeded.
    pub completed: usize,
    /// Steps that failed.
    pub failed: usize,
    /// Steps that were not invoked.
    pub skipped: usize,
}

/// Record of one plan execution, merged into its task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// Task the plan belonged to.
    pub task_id: String,
    /// Terminal status.
    pub status: ExecutionStatus,
    /// When the first step started.
    pub started_at: DateTime<Utc>,
    /// When the last step finished.
    pub finished_at: DateTime<Utc>,
    /// Per-step outcomes, in plan order.
    pub steps: Vec<StepOutcome>,
    /// Aggregate counters.
    pub metrics: ExecutionMetrics,
    /// Builder narration followed by executor narration.
    pub reasoning: Vec<String>,
    /// Risk tags carried over from the plan.
    #[serde(default)]
    pub risk_factors: Vec<RiskFactor>,
    /// Why the execution failed, when it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Execution {
    /// Outcome of a step by id.
    pub fn outcome(&self, step_id: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|o| o.step_id == step_id)
    }

    /// Outcomes of every step invoking `tool`.
    pub fn outcomes_for_tool<'a>(&'a self, tool: &'a str) -> impl Iterator<Item = &'a StepOutcome> {
        self.steps.iter().filter(move |o| o.tool == tool)
    }
}

/// Executes plans against a tool registry.
pub struct PlanExecutor {
    registry: Arc<ToolRegistry>,
    step_timeout: Option<Duration>,
}

impl fmt::Debug for PlanExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanExecutor")
            .field("registry", &self.registry)
            .field("step_timeout", &self.step_timeout)
            .finish()
    }
}

impl PlanExecutor {
    /// Creates an executor.
    pub fn new(registry: Arc<ToolRegistry>, config: &ExecutionConfig) -> Self {
        Self { registry, step_timeout: config.step_timeout() }
    }

    /// Executes `plan` until every step is terminal or `cancel` fires.
    ///
    /// Step failures never abort the run. Cancellation skips whatever has not
    /// finished and fails the execution.
    ///
    /// # Errors
    /// Returns [`HeraldError::Execution`] if the plan references unknown steps
    /// or a dependency can never become terminal.
    pub async fn execute(&self, mut plan: ExecutionPlan, cancel: &CancellationToken) -> Result<Execution> {
        check_references(&plan)?;
        for step in &mut plan.steps {
            step.status = StepStatus::Pending;
        }

        let started_at = Utc::now();
        let clock = Instant::now();
        let mut reasoning = plan.reasoning.clone();
        let mut outcomes: HashMap<String, StepOutcome> = HashMap::with_capacity(plan.steps.len());
        let mut in_flight = FuturesUnordered::new();
        let mut cancelled = false;

        info!(task_id = %plan.task_id, steps = plan.steps.len(), "Executing plan");

        loop {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            while let Some(index) = next_ready(&plan.steps) {
                let step = &mut plan.steps[index];
                if step.conditional {
                    let reason = step.skip_reason.clone().unwrap_or_else(|| "conditional step".to_string());
                    reasoning.push(format!("{} ({}) skipped: {reason}", step.id, step.tool));
                    step.status = StepStatus::Skipped;
                    outcomes.insert(step.id.clone(), StepOutcome::skipped(step, reason));
                } else {
                    step.status = StepStatus::Running;
                    let args = with_upstream(step, &outcomes);
                    in_flight.push(self.run_step(step.clone(), args, cancel));
                }
            }

            let Some(outcome) = in_flight.next().await else { break };
            if let Some(step) = plan.steps.iter_mut().find(|s| s.id == outcome.step_id) {
                step.status = outcome.status;
            }
            if outcome.status == StepStatus::Skipped {
                cancelled = true;
            }
            reasoning.push(narrate(&outcome));
            outcomes.insert(outcome.step_id.clone(), outcome);
            if cancelled {
                break;
            }
        }
        drop(in_flight);

        if cancelled {
            let remaining: Vec<&PlanStep> = plan.steps.iter().filter(|s| !outcomes.contains_key(&s.id)).collect();
            for step in remaining {
                outcomes.insert(step.id.clone(), StepOutcome::skipped(step, "cancelled"));
            }
            reasoning.push("Execution cancelled; remaining steps skipped".to_string());
        } else if outcomes.len() < plan.steps.len() {
            return Err(HeraldError::Execution(format!(
                "plan for task {} has steps whose dependencies never finish",
                plan.task_id
            )));
        }

        let steps: Vec<StepOutcome> = plan.steps.iter().filter_map(|s| outcomes.remove(&s.id)).collect();
        let metrics = ExecutionMetrics {
            duration_ms: clock.elapsed().as_millis() as u64,
            total_steps: steps.len(),
            completed: steps.iter().filter(|o| o.status == StepStatus::Completed).count(),
            failed: steps.iter().filter(|o| o.status == StepStatus::Failed).count(),
            skipped: steps.iter().filter(|o| o.status == StepStatus::Skipped).count(),
        };

        let (status, error) = if cancelled {
            (ExecutionStatus::Failed, Some("execution cancelled".to_string()))
        } else {
            classify(&plan, &steps, &metrics)
        };
        reasoning.push(format!(
            "Execution {status}: {} completed, {} failed, {} skipped in {} ms",
            metrics.completed, metrics.failed, metrics.skipped, metrics.duration_ms
        ));

        info!(
            task_id = %plan.task_id,
            status = %status,
            completed = metrics.completed,
            failed = metrics.failed,
            skipped = metrics.skipped,
            duration_ms = metrics.duration_ms,
            "Plan execution finished"
        );

        Ok(Execution {
            task_id: plan.task_id,
            status,
            started_at,
            finished_at: Utc::now(),
            steps,
            metrics,
            reasoning,
            risk_factors: plan.risk_factors.into_iter().collect(),
            error,
        })
    }

    async fn run_step(&self, step: PlanStep, args: Value, cancel: &CancellationToken) -> StepOutcome {
        debug!(step_id = %step.id, tool = %step.tool, "Invoking step");
        let start = Instant::now();
        let invocation = self.registry.invoke(&step.tool, args);

        let result = tokio::select! {
            result = with_timeout(self.step_timeout, invocation) => result,
            () = cancel.cancelled() => return StepOutcome::skipped(&step, "cancelled"),
        };
        let elapsed = start.elapsed().as_millis() as u64;

        match result {
            Some(Ok(envelope)) if envelope.success => StepOutcome {
                step_id: step.id.clone(),
                tool: step.tool.clone(),
                status: StepStatus::Completed,
                success: true,
                result: envelope.result,
                error: None,
                duration_ms: envelope.duration_ms,
            },
            Some(Ok(envelope)) => {
                let message = envelope.error.unwrap_or_else(|| "tool reported failure".to_string());
                let error = HeraldError::Step { step_id: step.id.clone(), tool: step.tool.clone(), message };
                warn!(error = %error, "Step failed");
                StepOutcome::failed(&step, error.to_string(), envelope.duration_ms)
            }
            Some(Err(e)) => {
                warn!(step_id = %step.id, tool = %step.tool, error = %e, "Step could not be invoked");
                StepOutcome::failed(&step, e.to_string(), elapsed)
            }
            None => {
                warn!(step_id = %step.id, tool = %step.tool, elapsed_ms = elapsed, "Step timed out");
                StepOutcome::failed(&step, format!("timed out after {elapsed} ms"), elapsed)
            }
        }
    }
}

/// Awaits `fut`, giving up after `limit` when one is set.
async fn with_timeout<F: Future>(limit: Option<Duration>, fut: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}

/// First pending step whose dependencies are all terminal.
fn next_ready(steps: &[PlanStep]) -> Option<usize> {
    steps.iter().position(|step| {
        step.status == StepStatus::Pending
            && step.depends_on.iter().all(|dep| steps.iter().any(|s| &s.id == dep && s.status.is_terminal()))
    })
}

fn check_references(plan: &ExecutionPlan) -> Result<()> {
    let mut ids = HashSet::with_capacity(plan.steps.len());
    for step in &plan.steps {
        if !ids.insert(step.id.as_str()) {
            return Err(HeraldError::Execution(format!("duplicate step id {}", step.id)));
        }
    }
    for step in &plan.steps {
        if let Some(dep) = step.depends_on.iter().find(|d| !ids.contains(d.as_str())) {
            return Err(HeraldError::Execution(format!("step {} depends on unknown step {dep}", step.id)));
        }
    }
    Ok(())
}

/// Step parameters plus an `upstream` object keyed by dependency id.
fn with_upstream(step: &PlanStep, outcomes: &HashMap<String, StepOutcome>) -> Value {
    let mut args = match &step.parameters {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other.clone());
            map
        }
    };
    if !step.depends_on.is_empty() {
        let upstream: Map<String, Value> = step
            .depends_on
            .iter()
            .map(|dep| {
                let value = outcomes.get(dep).and_then(|o| o.result.clone()).unwrap_or(Value::Null);
                (dep.clone(), value)
            })
            .collect();
        args.insert("upstream".to_string(), Value::Object(upstream));
    }
    Value::Object(args)
}

fn narrate(outcome: &StepOutcome) -> String {
    match outcome.status {
        StepStatus::Completed => {
            format!("{} ({}) completed in {} ms", outcome.step_id, outcome.tool, outcome.duration_ms)
        }
        _ => format!(
            "{} ({}) {}: {}",
            outcome.step_id,
            outcome.tool,
            outcome.status,
            outcome.error.as_deref().unwrap_or("no detail")
        ),
    }
}

fn classify(
    plan: &ExecutionPlan,
    steps: &[StepOutcome],
    metrics: &ExecutionMetrics,
) -> (ExecutionStatus, Option<String>) {
    let failed_root = plan.steps.iter().filter(|s| s.is_root_fetch()).find(|s| {
        steps.iter().any(|o| o.step_id == s.id && o.status == StepStatus::Failed)
    });
    if let Some(root) = failed_root {
        return (ExecutionStatus::Failed, Some(format!("root fetch {} ({}) failed", root.id, root.tool)));
    }

    let ran = metrics.completed + metrics.failed;
    if ran > 0 && metrics.completed == 0 {
        return (ExecutionStatus::Failed, Some("no step succeeded".to_string()));
    }
    if metrics.failed == 0 {
        (ExecutionStatus::Completed, None)
    } else {
        (ExecutionStatus::Partial, None)
    }
}
