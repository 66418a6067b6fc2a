// Error types for the orchestration pipeline

use thiserror::Error;

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, HeraldError>;

/// Orchestration errors
#[derive(Debug, Error)]
pub enum HeraldError {
    /// Task rejected at intake
    #[error("Invalid task: {0}")]
    Validation(String),

    /// Plan construction aborted; the task fails without running
    #[error("Planning failed for task '{task_id}': {reason}")]
    Planning {
        /// Task the plan was being built for
        task_id: String,
        /// Why construction stopped
        reason: String,
    },

    /// A single tool invocation failed
    #[error("Step '{step_id}' ({tool}) failed: {message}")]
    Step {
        /// Step identifier within the plan
        step_id: String,
        /// Tool the step invoked
        tool: String,
        /// Error reported by the tool
        message: String,
    },

    /// Fault in the executor loop itself
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Tool handler reported a failure
    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    /// Tool lookup failed
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool descriptor rejected at registration
    #[error("Invalid tool descriptor '{name}': {reason}")]
    InvalidTool {
        /// Name the descriptor was registered under
        name: String,
        /// Reason the descriptor was rejected
        reason: String,
    },

    /// Tool registered twice
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    /// Best-effort collaborator call failed
    #[error("Collaborator '{collaborator}' failed: {message}")]
    Collaborator {
        /// Which collaborator reported the failure
        collaborator: &'static str,
        /// Error message
        message: String,
    },

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// The orchestrator is not in a state that allows the operation
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl HeraldError {
    /// Shorthand for a planning error.
    pub fn planning(task_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Planning { task_id: task_id.into(), reason: reason.into() }
    }

    /// Shorthand for a collaborator error.
    pub fn collaborator(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self::Collaborator { collaborator, message: message.into() }
    }
}
