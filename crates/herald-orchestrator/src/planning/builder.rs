//! Plan builder.
//!
//! Turns a classified [`Task`] into an [`ExecutionPlan`]: a per-type template,
//! type-specific customisation, duplicate suppression for notifications, an
//! escalation step for repeatedly failing targets, and risk tagging.
//!
//! Steps are only ever appended and may only depend on steps that already
//! exist, so every plan is acyclic by construction.

use chrono::Utc;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::params::ParamResolvers;
use super::plan::{ExecutionPlan, PlanStep, RiskFactor, StepStatus};
use super::templates::{base_template, estimated_duration_ms, is_significant_transition, required_tools};
use crate::collaborators::NotificationHistory;
use crate::config::PlanningConfig;
use crate::error::{HeraldError, Result};
use crate::task::{Task, TaskType};
use crate::tools::catalog::{
    FETCH_BUILD_LOGS, FETCH_BUILD_TIMELINE, SEND_ESCALATION, SEND_NOTIFICATION, SUMMARIZE_BUILD_FAILURE,
    SUMMARIZE_STATE_CHANGE,
};
use crate::tools::{ToolCategory, ToolRegistry};

/// Builds execution plans for tasks.
pub struct PlanBuilder {
    registry: Arc<ToolRegistry>,
    history: Arc<dyn NotificationHistory>,
    resolvers: ParamResolvers,
    config: PlanningConfig,
}

impl std::fmt::Debug for PlanBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanBuilder")
            .field("registry", &self.registry)
            .field("resolvers", &self.resolvers)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Steps under construction for one plan.
struct StepList<'a> {
    task: &'a Task,
    builder: &'a PlanBuilder,
    steps: Vec<PlanStep>,
}

impl<'a> StepList<'a> {
    fn new(task: &'a Task, builder: &'a PlanBuilder) -> Self {
        Self { task, builder, steps: Vec::new() }
    }

    /// Appends a step and returns its id.
    fn push(&mut self, tool: &str, reason: impl Into<String>, depends_on: Vec<String>) -> Result<String> {
        let unknown = depends_on.iter().find(|dep| !self.steps.iter().any(|s| &s.id == *dep));
        if let Some(dep) = unknown {
            return Err(HeraldError::planning(&self.task.id, format!("step for {tool} depends on unknown step {dep}")));
        }

        let parameters = self
            .builder
            .resolvers
            .resolve(tool, self.task)
            .ok_or_else(|| HeraldError::planning(&self.task.id, format!("no parameter resolver for {tool}")))?;
        let category = self
            .builder
            .registry
            .category_of(tool)
            .ok_or_else(|| HeraldError::planning(&self.task.id, format!("tool {tool} is not registered")))?;

        let id = format!("step_{}", self.steps.len() + 1);
        self.steps.push(PlanStep {
            id: id.clone(),
            tool: tool.to_string(),
            category,
            reason: reason.into(),
            parameters: Value::Object(parameters),
            status: StepStatus::Pending,
            depends_on,
            estimated_ms: estimated_duration_ms(tool),
            conditional: false,
            skip_reason: None,
        });
        Ok(id)
    }

    fn last_id(&self) -> Option<String> {
        self.steps.last().map(|s| s.id.clone())
    }
}

impl PlanBuilder {
    /// Creates a builder with the standard parameter resolvers.
    ///
    /// # Errors
    /// Fails if a tool any plan may use is not registered.
    pub fn new(
        registry: Arc<ToolRegistry>,
        history: Arc<dyn NotificationHistory>,
        config: PlanningConfig,
    ) -> Result<Self> {
        Self::with_resolvers(registry, history, config, ParamResolvers::standard())
    }

    /// Creates a builder with a custom resolver table.
    ///
    /// # Errors
    /// Fails if a tool any plan may use has no resolver or is not registered.
    pub fn with_resolvers(
        registry: Arc<ToolRegistry>,
        history: Arc<dyn NotificationHistory>,
        config: PlanningConfig,
        resolvers: ParamResolvers,
    ) -> Result<Self> {
        let missing_resolvers: Vec<&str> = required_tools().into_iter().filter(|t| !resolvers.contains(t)).collect();
        if !missing_resolvers.is_empty() {
            return Err(HeraldError::Config(format!(
                "no parameter resolver for: {}",
                missing_resolvers.join(", ")
            )));
        }

        let unregistered: Vec<&str> = required_tools().into_iter().filter(|t| !registry.contains(t)).collect();
        if !unregistered.is_empty() {
            return Err(HeraldError::Config(format!("tools not registered: {}", unregistered.join(", "))));
        }

        Ok(Self { registry, history, resolvers, config })
    }

    /// Planning settings in use.
    pub fn config(&self) -> &PlanningConfig {
        &self.config
    }

    /// Builds the plan for `task`.
    ///
    /// The step structure depends only on the task and on the notification
    /// history; timestamps differ between calls.
    ///
    /// # Errors
    /// Returns [`HeraldError::Planning`] when construction cannot finish. No
    /// partial plan is returned.
    pub async fn build_plan(&self, task: &Task) -> Result<ExecutionPlan> {
        let mut reasoning = Vec::new();
        let mut steps = StepList::new(task, self);

        let template = base_template(task.task_type);
        reasoning.push(format!(
            "Task {} ({}, {} priority): base template has {} step(s)",
            task.id,
            task.task_type,
            task.priority,
            template.len()
        ));
        for tool in template {
            let depends_on = steps.last_id().into_iter().collect();
            steps.push(tool, format!("{} template", task.task_type), depends_on)?;
        }

        self.customise(task, &mut steps, &mut reasoning)?;
        let mut steps = steps.steps;

        self.suppress_duplicates(task, &mut steps, &mut reasoning).await?;
        self.escalate(task, &mut steps, &mut reasoning).await?;

        let estimated_ms = steps.iter().map(|s| s.estimated_ms).sum();
        let risk_factors = self.assess_risk(&steps, estimated_ms);
        if !risk_factors.is_empty() {
            let tags: Vec<String> = risk_factors.iter().map(ToString::to_string).collect();
            reasoning.push(format!("Risk factors: {}", tags.join(", ")));
        }
        reasoning.push(format!("Plan ready: {} step(s), about {} ms", steps.len(), estimated_ms));

        debug!(
            task_id = %task.id,
            steps = steps.len(),
            estimated_ms,
            risks = risk_factors.len(),
            "Built execution plan"
        );

        Ok(ExecutionPlan {
            task_id: task.id.clone(),
            steps,
            reasoning,
            estimated_ms,
            risk_factors,
            created_at: Utc::now(),
        })
    }

    fn customise(&self, task: &Task, steps: &mut StepList<'_>, reasoning: &mut Vec<String>) -> Result<()> {
        match task.task_type {
            TaskType::BuildCompleted if task.context.is_failure_result() => {
                let fetch = steps
                    .last_id()
                    .ok_or_else(|| HeraldError::planning(&task.id, "build template produced no fetch step"))?;
                let timeline =
                    steps.push(FETCH_BUILD_TIMELINE, "Locate the failing stage", vec![fetch.clone()])?;
                let logs = steps.push(FETCH_BUILD_LOGS, "Collect failure output", vec![fetch.clone()])?;
                let summary =
                    steps.push(SUMMARIZE_BUILD_FAILURE, "Explain the failure", vec![timeline, logs])?;
                steps.push(SEND_NOTIFICATION, "Report the failed build", vec![fetch, summary])?;
                reasoning.push(format!(
                    "Build {} failed: added timeline, logs and failure summary ahead of the notification",
                    task.target()
                ));
            }
            TaskType::BuildCompleted => {
                let depends_on = steps.last_id().into_iter().collect();
                steps.push(SEND_NOTIFICATION, "Report the finished build", depends_on)?;
                let result = task.context.result.as_deref().unwrap_or("unknown");
                reasoning.push(format!("Build {} finished ({result}): notification only", task.target()));
            }
            TaskType::ItemCreated | TaskType::ItemUpdated => {
                let (Some(from), Some(to)) =
                    (task.context.previous_state.as_deref(), task.context.new_state.as_deref())
                else {
                    return Ok(());
                };
                if !is_significant_transition(from, to) {
                    reasoning.push(format!("Transition {from} -> {to} is routine: no summary"));
                    return Ok(());
                }
                self.insert_state_summary(task, steps, from, to)?;
                reasoning.push(format!("Transition {from} -> {to} is significant: summary added before notifying"));
            }
            _ => {}
        }
        Ok(())
    }

    /// Inserts a state-change summary between the fetch and the notification.
    ///
    /// The notification is the last template step; it is taken off and
    /// appended again after the summary so its new dependency still points
    /// backwards.
    fn insert_state_summary(&self, task: &Task, steps: &mut StepList<'_>, from: &str, to: &str) -> Result<()> {
        let notification = match steps.steps.last() {
            Some(last) if last.tool == SEND_NOTIFICATION => steps.steps.pop(),
            _ => None,
        };

        let fetch = steps.last_id().into_iter().collect();
        let summary = steps.push(SUMMARIZE_STATE_CHANGE, format!("Summarize {from} -> {to}"), fetch)?;

        if let Some(notification) = notification {
            let mut depends_on = notification.depends_on;
            depends_on.push(summary);
            steps.push(SEND_NOTIFICATION, notification.reason, depends_on)?;
        }

        debug!(task_id = %task.id, from, to, "Inserted state summary");
        Ok(())
    }

    async fn suppress_duplicates(
        &self,
        task: &Task,
        steps: &mut [PlanStep],
        reasoning: &mut Vec<String>,
    ) -> Result<()> {
        let Some(target) = task.context.target_id.as_deref() else {
            return Ok(());
        };
        if !steps.iter().any(|s| s.category == ToolCategory::Notify) {
            return Ok(());
        }

        let window = self.config.dedup_window_hours;
        let recent = self
            .history
            .is_recent_for_target(target, window)
            .await
            .map_err(|e| HeraldError::planning(&task.id, format!("notification history lookup failed: {e}")))?;
        if !recent {
            return Ok(());
        }

        let skip_reason = format!("target {target} was notified within the last {window} h");
        for step in steps.iter_mut().filter(|s| s.category == ToolCategory::Notify) {
            step.conditional = true;
            step.skip_reason = Some(skip_reason.clone());
            reasoning.push(format!("{} ({}) made conditional: {skip_reason}", step.id, step.tool));
        }
        Ok(())
    }

    async fn escalate(&self, task: &Task, steps: &mut Vec<PlanStep>, reasoning: &mut Vec<String>) -> Result<()> {
        let Some(target) = task.context.target_id.as_deref() else {
            return Ok(());
        };
        if !task.context.is_failure_result() {
            return Ok(());
        }

        let category = task.escalation_category();
        let verdict = self
            .history
            .should_escalate(target, &category, self.config.escalation_threshold, self.config.escalation_window_hours)
            .await
            .map_err(|e| HeraldError::planning(&task.id, format!("escalation lookup failed: {e}")))?;
        if !verdict.escalate {
            return Ok(());
        }

        let mut list = StepList { task, builder: self, steps: std::mem::take(steps) };
        list.push(
            SEND_ESCALATION,
            format!("{} {category} failures within {} h", verdict.count, self.config.escalation_window_hours),
            Vec::new(),
        )?;
        if let Some(Value::Object(params)) = list.steps.last_mut().map(|s| &mut s.parameters) {
            params.insert("failure_count".to_string(), json!(verdict.count));
        }
        *steps = list.steps;

        warn!(task_id = %task.id, target, category = %category, count = verdict.count, "Escalating repeated failures");
        reasoning.push(format!(
            "Escalation: {target} reached {} {category} notification(s), threshold {}",
            verdict.count, self.config.escalation_threshold
        ));
        Ok(())
    }

    fn assess_risk(&self, steps: &[PlanStep], estimated_ms: u64) -> BTreeSet<RiskFactor> {
        let limits = &self.config.risk;
        let mut risks = BTreeSet::new();

        let external = steps.iter().filter(|s| s.category.is_external()).count();
        if external > limits.max_external_steps {
            risks.insert(RiskFactor::ManyExternalCalls);
        }
        if estimated_ms > limits.max_estimated_ms {
            risks.insert(RiskFactor::LongRunning);
        }
        if steps.iter().any(|s| s.category == ToolCategory::Summarize) {
            risks.insert(RiskFactor::UsesSummarization);
        }
        let notifications = steps.iter().filter(|s| s.category == ToolCategory::Notify).count();
        if notifications > limits.max_notification_steps {
            risks.insert(RiskFactor::ManyNotifications);
        }
        risks
    }
}
