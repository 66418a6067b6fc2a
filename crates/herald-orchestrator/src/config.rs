// Herald configuration
//
// Queue, planning, execution and logging settings. Every field has a default,
// so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{HeraldError, Result};

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeraldConfig {
    /// Queue and dispatch settings
    pub orchestrator: OrchestratorConfig,
    /// Plan builder settings
    pub planning: PlanningConfig,
    /// Plan executor settings
    pub execution: ExecutionConfig,
    /// Logging settings (consumed by the binary)
    pub logging: LoggingConfig,
}

/// Queue and dispatch settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum number of tasks processed at once
    pub max_concurrent_tasks: usize,
    /// Number of finished tasks kept in history
    pub history_size: usize,
    /// Number of reasoning lines kept for the status surface
    pub reasoning_buffer: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { max_concurrent_tasks: 3, history_size: 100, reasoning_buffer: 50 }
    }
}

/// Plan builder settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    /// A notification inside this window makes later notifications for the same target conditional
    pub dedup_window_hours: u64,
    /// Failures inside the escalation window needed to escalate
    pub escalation_threshold: u32,
    /// Window for counting failures
    pub escalation_window_hours: u64,
    /// Risk tagging thresholds
    pub risk: RiskThresholds,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            dedup_window_hours: 1,
            escalation_threshold: 3,
            escalation_window_hours: 24,
            risk: RiskThresholds::default(),
        }
    }
}

/// Thresholds above which a plan is tagged with a risk factor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    /// External-dependency steps
    pub max_external_steps: usize,
    /// Total estimated duration in milliseconds
    pub max_estimated_ms: u64,
    /// Notification steps
    pub max_notification_steps: usize,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self { max_external_steps: 3, max_estimated_ms: 15_000, max_notification_steps: 2 }
    }
}

/// Plan executor settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Per-step timeout in milliseconds; unset means no timeout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_timeout_ms: Option<u64>,
}

impl ExecutionConfig {
    /// Per-step timeout as a duration
    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_ms.map(Duration::from_millis)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter level (overridden by RUST_LOG)
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Pretty }
    }
}

impl HeraldConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the concurrency cap
    #[must_use]
    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.orchestrator.max_concurrent_tasks = max;
        self
    }

    /// Check values that would make the orchestrator unusable
    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.max_concurrent_tasks == 0 {
            return Err(HeraldError::Config("orchestrator.max_concurrent_tasks must be at least 1".to_string()));
        }
        if self.orchestrator.history_size == 0 {
            return Err(HeraldError::Config("orchestrator.history_size must be at least 1".to_string()));
        }
        if self.execution.step_timeout_ms == Some(0) {
            return Err(HeraldError::Config("execution.step_timeout_ms must be positive when set".to_string()));
        }
        Ok(())
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// Returns error if file cannot be read, parsed or validated
    pub fn load_from_toml(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| HeraldError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Load configuration from TOML string
    ///
    /// Accepts either bare sections or everything nested under `[herald]`.
    ///
    /// # Errors
    /// Returns error if TOML cannot be parsed or the result is invalid
    pub fn from_toml_str(toml_content: &str) -> Result<Self> {
        let value: toml::Value = toml::from_str(toml_content)?;

        let config_value = match value.get("herald") {
            Some(herald) => herald.clone(),
            None => value,
        };

        let config: Self = config_value.try_into()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories
    ///
    /// # Errors
    /// Returns error if the file cannot be written
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| HeraldError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = HeraldConfig::default();
        assert_eq!(config.orchestrator.max_concurrent_tasks, 3);
        assert_eq!(config.orchestrator.history_size, 100);
        assert_eq!(config.planning.escalation_threshold, 3);
        assert_eq!(config.planning.risk.max_estimated_ms, 15_000);
        assert_eq!(config.execution.step_timeout(), None);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_string_is_default() {
        assert_eq!(HeraldConfig::from_toml_str("").unwrap(), HeraldConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let config = HeraldConfig::from_toml_str(
            r#"
            [orchestrator]
            max_concurrent_tasks = 5

            [planning.risk]
            max_notification_steps = 4

            [execution]
            step_timeout_ms = 2500

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.orchestrator.max_concurrent_tasks, 5);
        assert_eq!(config.orchestrator.history_size, 100);
        assert_eq!(config.planning.risk.max_notification_steps, 4);
        assert_eq!(config.planning.risk.max_external_steps, 3);
        assert_eq!(config.execution.step_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_herald_wrapper_section() {
        let config = HeraldConfig::from_toml_str(
            r#"
            [herald.planning]
            dedup_window_hours = 6
            "#,
        )
        .unwrap();
        assert_eq!(config.planning.dedup_window_hours, 6);
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let err = HeraldConfig::from_toml_str("[orchestrator]\nmax_concurrent_tasks = 0\n").unwrap_err();
        assert!(matches!(err, HeraldError::Config(_)));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(matches!(HeraldConfig::from_toml_str("[orchestrator"), Err(HeraldError::Toml(_))));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("herald.toml");

        let mut config = HeraldConfig::default().with_max_concurrent_tasks(7);
        config.execution.step_timeout_ms = Some(1000);
        config.save_to_file(&path).unwrap();

        let loaded = HeraldConfig::load_from_toml(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = HeraldConfig::load_from_toml(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, HeraldError::Config(_)));
    }
}
