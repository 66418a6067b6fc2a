//! Plan construction.

pub mod builder;
pub mod params;
pub mod plan;
pub mod templates;

pub use builder::PlanBuilder;
pub use params::{ParamResolver, ParamResolvers};
pub use plan::{ExecutionPlan, PlanStep, RiskFactor, StepStatus};
