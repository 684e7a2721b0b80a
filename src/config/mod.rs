// ABOUTME: Configuration types and parsing for safeship.yml.
// ABOUTME: Handles YAML parsing, discovery, defaults, and cross-field validation.

mod audit;
mod deserialize;
mod env_value;
mod firewall;
mod gate;
mod healthcheck;
mod init;
mod source;

pub use audit::{AuditConfig, PortEntry};
pub use env_value::{EnvValue, RESERVED_PREFIX, resolve_env_map};
pub use firewall::FirewallConfig;
pub use gate::GateConfig;
pub use healthcheck::HealthcheckConfig;
pub use init::init_config;
pub use source::SourceConfig;

use crate::error::{Error, Result};
use crate::types::ServiceName;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "safeship.yml";
pub const CONFIG_FILENAME_ALT: &str = "safeship.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".safeship/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Supervisor unit restarted and queried for health.
    pub service: ServiceName,

    /// Live application tree.
    pub app_dir: PathBuf,

    /// Where snapshot archives are kept.
    pub backup_dir: PathBuf,

    /// Locks and release ledger. Defaults to `<backup_dir>/.safeship`.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    #[serde(default = "default_retention")]
    pub retention: usize,

    pub gate: GateConfig,

    pub source: SourceConfig,

    #[serde(default)]
    pub dependencies: Option<DependencyConfig>,

    #[serde(default)]
    pub health: HealthcheckConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub firewall: Option<FirewallConfig>,

    #[serde(default)]
    pub audit: Option<AuditConfig>,
}

/// Dependency set resynchronized when its manifest changes between releases.
#[derive(Debug, Clone, Deserialize)]
pub struct DependencyConfig {
    /// Manifest path relative to `app_dir`, e.g. `requirements.txt`.
    pub manifest: PathBuf,
    /// Shell command run in `app_dir` when the manifest digest changed.
    pub command: String,
    #[serde(default = "default_dependency_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SupervisorConfig {
    /// Run systemctl through `sudo -n`.
    #[serde(default)]
    pub sudo: bool,
}

fn default_retention() -> usize {
    5
}

fn default_dependency_timeout() -> Duration {
    Duration::from_secs(600)
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Reject combinations that would make snapshots or rollbacks unsafe.
    pub fn validate(&self) -> Result<()> {
        if self.retention == 0 {
            return Err(Error::InvalidConfig(
                "retention must keep at least one snapshot".to_string(),
            ));
        }

        if self.backup_dir.starts_with(&self.app_dir) {
            return Err(Error::InvalidConfig(format!(
                "backup_dir {} must not be inside app_dir {}",
                self.backup_dir.display(),
                self.app_dir.display()
            )));
        }

        if self.state_dir().starts_with(&self.app_dir) {
            return Err(Error::InvalidConfig(format!(
                "state_dir {} must not be inside app_dir {}",
                self.state_dir().display(),
                self.app_dir.display()
            )));
        }

        if let Some(key) = env_value::reserved_key(&self.gate.env) {
            return Err(Error::InvalidConfig(format!(
                "gate.env.{key}: names starting with {RESERVED_PREFIX} are set by safeship"
            )));
        }

        if self.health.interval.is_zero() {
            return Err(Error::InvalidConfig(
                "health.interval must be greater than zero".to_string(),
            ));
        }

        if let SourceConfig::Directory { ref path, .. } = self.source
            && path.starts_with(&self.app_dir)
        {
            return Err(Error::InvalidConfig(format!(
                "release directory {} must not be inside app_dir",
                path.display()
            )));
        }

        if let Some(ref audit) = self.audit {
            audit.validate()?;
        }

        Ok(())
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| self.backup_dir.join(".safeship"))
    }

    pub fn firewall(&self) -> Result<&FirewallConfig> {
        self.firewall.as_ref().ok_or(Error::MissingSection("firewall"))
    }

    pub fn audit(&self) -> Result<&AuditConfig> {
        self.audit.as_ref().ok_or(Error::MissingSection("audit"))
    }

    /// Starting point written by `safeship init`.
    pub fn template(service: ServiceName) -> Self {
        Config {
            app_dir: Path::new("/opt").join(service.as_str()),
            backup_dir: Path::new("/opt/backups").join(service.as_str()),
            service,
            state_dir: None,
            retention: default_retention(),
            gate: GateConfig::new("python -m pytest -q"),
            source: SourceConfig::Git {
                remote: "origin".to_string(),
            },
            dependencies: None,
            health: HealthcheckConfig::default(),
            supervisor: SupervisorConfig::default(),
            firewall: None,
            audit: None,
        }
    }
}
