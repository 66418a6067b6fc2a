//! Config command: print the effective configuration.

use anyhow::Result;
use herald_orchestrator::HeraldConfig;

/// Print the configuration as TOML
pub fn show(config: &HeraldConfig) -> Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
