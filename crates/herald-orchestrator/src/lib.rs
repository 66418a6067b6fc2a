//! Task orchestration pipeline for project-tracking and CI events.
//!
//! Events become [`Task`]s, the [`Orchestrator`] queues them by priority and
//! runs a bounded number at once, the [`PlanBuilder`] turns each into an
//! [`ExecutionPlan`] and the [`PlanExecutor`] runs the plan's steps through
//! the [`ToolRegistry`].

pub mod classifier;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod execution;
pub mod orchestrator;
pub mod planning;
pub mod task;
pub mod tools;

#[cfg(test)]
mod test_support;

pub use classifier::DefaultClassifier;
pub use collaborators::{
    Classifier, EscalationVerdict, MemoryNotificationHistory, MemoryResultsStore, MemoryStateStore,
    NotificationHistory, Relationships, ResultsStore, StateStore, Validation,
};
pub use config::{ExecutionConfig, HeraldConfig, LogFormat, LoggingConfig, OrchestratorConfig, PlanningConfig};
pub use error::{HeraldError, Result};
pub use execution::{Execution, ExecutionMetrics, ExecutionStatus, PlanExecutor, StepOutcome};
pub use orchestrator::{Collaborators, EnqueueOutcome, Orchestrator, OrchestratorStatus};
pub use planning::{ExecutionPlan, PlanBuilder, PlanStep, RiskFactor, StepStatus};
pub use task::{Priority, Task, TaskContext, TaskStatus, TaskType};
pub use tools::{ToolCategory, ToolDescriptor, ToolEnvelope, ToolRegistry, ToolStats};
