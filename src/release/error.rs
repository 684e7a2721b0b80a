// ABOUTME: Error types for release and rollback operations.
// ABOUTME: Every terminal failure carries a kind and an operator-facing recovery hint.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::lock::LockError;
use crate::snapshot::SnapshotError;

/// Errors that end a release or a manual rollback.
#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    /// Test gate did not pass. Nothing on the host was touched.
    #[error("test gate failed for {revision}: {message}")]
    GateFailure { revision: String, message: String },

    /// Pre-release snapshot could not be written. Nothing on the host was touched.
    #[error("snapshot before release failed: {0}")]
    SnapshotFailure(#[source] SnapshotError),

    #[error("update to {revision} failed: {message}")]
    UpdateFailure { revision: String, message: String },

    #[error("restart of {service} failed: {message}")]
    RestartFailure { service: String, message: String },

    #[error("{service} not healthy within {timeout:?}")]
    HealthCheckTimeout { service: String, timeout: Duration },

    /// The release failed after mutation and the snapshot was put back.
    #[error("{cause}; restored snapshot {snapshot}")]
    RolledBack {
        cause: Box<ReleaseError>,
        snapshot: String,
    },

    /// Restoring the previous state failed. Never retried.
    #[error("rollback failed during {step}: {message}{}", after(.cause))]
    RollbackFailure {
        step: RollbackStep,
        service: String,
        message: String,
        cause: Option<String>,
    },

    #[error("no snapshot available to roll back to")]
    NoSnapshot,

    #[error(transparent)]
    Lock(#[from] LockError),

    /// The ledger could not be read before starting. Writes after a healthy
    /// release only produce warnings.
    #[error("release ledger {path}: {source}")]
    Ledger {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn after(cause: &Option<String>) -> String {
    cause
        .as_ref()
        .map(|c| format!(" (rolling back after: {c})"))
        .unwrap_or_default()
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseErrorKind {
    GateFailure,
    SnapshotFailure,
    UpdateFailure,
    RestartFailure,
    HealthCheckTimeout,
    RollbackFailure,
    LockHeld,
    NoSnapshot,
    Ledger,
}

/// Step of a rollback that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackStep {
    Restore,
    Verify,
    Dependencies,
    Restart,
    HealthCheck,
}

impl fmt::Display for RollbackStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RollbackStep::Restore => "restore",
            RollbackStep::Verify => "verification",
            RollbackStep::Dependencies => "dependency sync",
            RollbackStep::Restart => "restart",
            RollbackStep::HealthCheck => "health check",
        };
        f.write_str(s)
    }
}

impl ReleaseError {
    /// Returns the error kind for programmatic handling. A rolled-back
    /// release reports the kind of the failure that triggered the rollback.
    pub fn kind(&self) -> ReleaseErrorKind {
        match self {
            ReleaseError::GateFailure { .. } => ReleaseErrorKind::GateFailure,
            ReleaseError::SnapshotFailure(_) => ReleaseErrorKind::SnapshotFailure,
            ReleaseError::UpdateFailure { .. } => ReleaseErrorKind::UpdateFailure,
            ReleaseError::RestartFailure { .. } => ReleaseErrorKind::RestartFailure,
            ReleaseError::HealthCheckTimeout { .. } => ReleaseErrorKind::HealthCheckTimeout,
            ReleaseError::RolledBack { cause, .. } => cause.kind(),
            ReleaseError::RollbackFailure { .. } => ReleaseErrorKind::RollbackFailure,
            ReleaseError::NoSnapshot => ReleaseErrorKind::NoSnapshot,
            ReleaseError::Lock(_) => ReleaseErrorKind::LockHeld,
            ReleaseError::Ledger { .. } => ReleaseErrorKind::Ledger,
        }
    }

    /// True when the live tree is known to be as it was before the release.
    pub fn host_unchanged(&self) -> bool {
        matches!(
            self,
            ReleaseError::GateFailure { .. }
                | ReleaseError::SnapshotFailure(_)
                | ReleaseError::RolledBack { .. }
                | ReleaseError::Lock(_)
                | ReleaseError::Ledger { .. }
        )
    }

    pub fn recovery_hint(&self) -> String {
        match self {
            ReleaseError::GateFailure { .. } => {
                "nothing on the host changed; fix the failing tests and release again".to_string()
            }
            ReleaseError::SnapshotFailure(_) => {
                "nothing on the host changed; check free space and permissions of backup_dir"
                    .to_string()
            }
            ReleaseError::UpdateFailure { .. }
            | ReleaseError::RestartFailure { .. }
            | ReleaseError::HealthCheckTimeout { .. } => {
                "run `safeship rollback` to restore the last snapshot".to_string()
            }
            ReleaseError::RolledBack { snapshot, .. } => format!(
                "the previous tree is live again (from {snapshot}); fix the failure and release again"
            ),
            ReleaseError::RollbackFailure { step, service, .. } => format!(
                "the host needs manual attention: the {step} step failed; inspect `systemctl status {service}`, then run `safeship rollback`"
            ),
            ReleaseError::NoSnapshot => {
                "no snapshot exists yet; one is taken before every release".to_string()
            }
            ReleaseError::Lock(e) => e.recovery_hint(),
            ReleaseError::Ledger { path, .. } => format!(
                "nothing on the host changed; check that {} is readable",
                path.display()
            ),
        }
    }
}

impl From<SnapshotError> for ReleaseError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::NoSnapshot => ReleaseError::NoSnapshot,
            other => ReleaseError::SnapshotFailure(other),
        }
    }
}
