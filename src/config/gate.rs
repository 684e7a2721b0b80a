// ABOUTME: Test gate configuration.
// ABOUTME: The shell command that must pass before a release may touch the live tree.

use super::env_value::EnvValue;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    pub command: String,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Extra environment for the test run (literals or `{env: VAR}` references).
    #[serde(default)]
    pub env: HashMap<String, EnvValue>,
}

fn default_timeout() -> Duration {
    Duration::from_secs(600)
}

impl GateConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: default_timeout(),
            env: HashMap::new(),
        }
    }
}
