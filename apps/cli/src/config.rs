//! CLI configuration loading.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use herald_orchestrator::HeraldConfig;
use tracing::debug;

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "HERALD_CONFIG";

/// Config file picked up from the working directory.
pub const LOCAL_CONFIG: &str = "herald.toml";

/// Load configuration.
///
/// Configuration precedence:
/// 1. `--config <path>`
/// 2. `HERALD_CONFIG`
/// 3. Local config file (`./herald.toml`)
/// 4. Defaults
pub fn load_config(explicit: Option<&Path>) -> Result<HeraldConfig> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .or_else(|| Some(PathBuf::from(LOCAL_CONFIG)).filter(|p| p.is_file()));

    match path {
        Some(path) => {
            debug!(path = %path.display(), "Loading configuration");
            HeraldConfig::load_from_toml(&path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))
        }
        None => Ok(HeraldConfig::default()),
    }
}
