//! Queue and concurrency control.

pub mod controller;
pub mod history;
pub mod queue;

pub use controller::{Collaborators, EnqueueOutcome, Orchestrator, OrchestratorStatus, RESULTS_HISTORY_KEY};
pub use history::TaskHistory;
pub use queue::TaskQueue;
