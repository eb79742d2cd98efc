//! Runner configuration.
//!
//! Loaded via the `config` crate from `WAYPOINT__*` environment variables,
//! with `__` separating nested keys:
//!
//! ```text
//! WAYPOINT__DEFINITION_PATH=order.json
//! WAYPOINT__SCRIPT_PATH=order-script.json
//! WAYPOINT__ENGINE__MAX_AUTOMATIC_STEPS=256
//! ```

use serde::Deserialize;
use std::path::PathBuf;
use waypoint_workflow::EngineConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    /// Versioned definition document to load.
    pub definition_path: PathBuf,

    /// JSON array of completion steps.
    pub script_path: PathBuf,

    /// Engine tunables.
    #[serde(default)]
    pub engine: EngineConfig,
}

impl RunnerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_environment(environment())
    }

    fn from_environment(source: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("WAYPOINT")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
