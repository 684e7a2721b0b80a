// ABOUTME: systemd-backed ProcessSupervisor.
// ABOUTME: Shells out to `systemctl restart` and `systemctl is-active`.

use super::{ProcessSupervisor, ServiceState, SupervisorError};
use crate::exec::CommandSpec;
use crate::types::ServiceName;
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SystemctlSupervisor {
    sudo: bool,
    timeout: Duration,
}

impl SystemctlSupervisor {
    pub fn new(sudo: bool) -> Self {
        Self {
            sudo,
            timeout: Duration::from_secs(90),
        }
    }

    fn systemctl(&self) -> CommandSpec {
        CommandSpec::privileged("systemctl", self.sudo).timeout(self.timeout)
    }
}

#[async_trait]
impl ProcessSupervisor for SystemctlSupervisor {
    async fn restart(&self, service: &ServiceName) -> Result<(), SupervisorError> {
        let output = self
            .systemctl()
            .arg("restart")
            .arg("--")
            .arg(service.as_str())
            .run()
            .await?;

        if !output.success() {
            return Err(SupervisorError::RestartFailed {
                service: service.to_string(),
                message: output.summary(),
            });
        }
        Ok(())
    }

    async fn active_state(&self, service: &ServiceName) -> Result<ServiceState, SupervisorError> {
        // is-active exits non-zero for anything but "active"; only stdout matters.
        let output = self
            .systemctl()
            .arg("is-active")
            .arg("--")
            .arg(service.as_str())
            .run()
            .await?;

        if output.stdout.trim().is_empty() {
            return Err(SupervisorError::QueryFailed(output.summary()));
        }
        Ok(ServiceState::from_is_active(&output.stdout))
    }
}
