// ABOUTME: Application-wide error types for safeship.
// ABOUTME: Uses thiserror to fold component errors into one CLI-facing type.

use std::path::PathBuf;
use thiserror::Error;

use crate::audit::AuditError;
use crate::firewall::FirewallError;
use crate::lock::LockError;
use crate::release::ReleaseError;
use crate::snapshot::SnapshotError;
use crate::supervisor::SupervisorError;
use crate::types::ParseRevisionError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("configuration has no `{0}` section")]
    MissingSection(&'static str),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("aborted: {0}")]
    Aborted(String),

    #[error("invalid revision: {0}")]
    Revision(#[from] ParseRevisionError),

    #[error(transparent)]
    Release(#[from] ReleaseError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Firewall(#[from] FirewallError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Operator-facing next step, when the failure has one.
    pub fn recovery_hint(&self) -> Option<String> {
        match self {
            Error::Release(e) => Some(e.recovery_hint()),
            Error::Lock(e) => Some(e.recovery_hint()),
            Error::Firewall(e) => e.recovery_hint(),
            Error::Audit(e) => Some(e.recovery_hint()),
            Error::Revision(_) => Some("tags look like 1.4.2 or v1.4.2-rc.1".to_string()),
            Error::ConfigNotFound(_) => Some("run `safeship init` to create one".to_string()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
