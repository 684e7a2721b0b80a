// ABOUTME: Post-restart health check configuration.
// ABOUTME: Settle delay, polling interval, and the overall deadline.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct HealthcheckConfig {
    /// Wait before the first check so a starting process is not misread.
    #[serde(default = "default_settle", with = "humantime_serde")]
    pub settle: Duration,

    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_settle() -> Duration {
    Duration::from_secs(3)
}

fn default_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for HealthcheckConfig {
    fn default() -> Self {
        HealthcheckConfig {
            settle: default_settle(),
            interval: default_interval(),
            timeout: default_timeout(),
        }
    }
}
