//! Engine configuration

use super::error::{Result, RuntimeError};
use serde::{Deserialize, Serialize};

fn default_name() -> String {
    "ground".to_string()
}

fn default_fuel() -> usize {
    1000
}

/// Settings for a [`Ground`](super::Ground) driver.
///
/// Every field has a default, so `{}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Name used in log output
    #[serde(default = "default_name")]
    pub name: String,

    /// Maximum number of script/commit batches per [`Ground::step`](super::Ground::step)
    #[serde(default = "default_fuel")]
    pub fuel: usize,

    /// Emit a debug event for every committed turn
    #[serde(default)]
    pub log_turns: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            fuel: default_fuel(),
            log_turns: false,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fuel == 0 {
            return Err(RuntimeError::Config("fuel must be at least 1".into()));
        }
        Ok(())
    }
}
