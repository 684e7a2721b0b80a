// ABOUTME: Process supervisor capability: restart a unit and ask for its activation state.
// ABOUTME: The systemctl implementation is the only place safeship touches process lifecycle.

mod systemctl;

pub use systemctl::SystemctlSupervisor;

use crate::exec::ExecError;
use crate::types::ServiceName;
use async_trait::async_trait;
use std::fmt;

/// Activation state as reported by the supervisor. Derived on every query,
/// never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Active,
    Inactive,
    Unknown,
}

impl ServiceState {
    /// Map `systemctl is-active` output onto the three states.
    pub fn from_is_active(output: &str) -> Self {
        match output.trim() {
            "active" | "reloading" => ServiceState::Active,
            "inactive" | "failed" | "deactivating" | "activating" => ServiceState::Inactive,
            _ => ServiceState::Unknown,
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Active => "active",
            ServiceState::Inactive => "inactive",
            ServiceState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Service lifecycle operations owned by the host's process supervisor.
#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    /// Restart the unit. Returns once the supervisor accepted the request.
    async fn restart(&self, service: &ServiceName) -> Result<(), SupervisorError>;

    /// Current activation state of the unit.
    async fn active_state(&self, service: &ServiceName) -> Result<ServiceState, SupervisorError>;
}

/// Errors from supervisor operations.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("restart of {service} failed: {message}")]
    RestartFailed { service: String, message: String },

    #[error("supervisor query failed: {0}")]
    QueryFailed(String),

    #[error(transparent)]
    Exec(#[from] ExecError),
}
