//! Plan execution.

pub mod executor;

pub use executor::{Execution, ExecutionMetrics, ExecutionStatus, PlanExecutor, StepOutcome};
