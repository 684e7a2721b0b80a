// ABOUTME: Health prober answering "is the service healthy right now?".
// ABOUTME: Single supervisor query plus a bounded polling wait with a settle delay.

use std::time::{Duration, Instant};

use crate::config::HealthcheckConfig;
use crate::supervisor::{ProcessSupervisor, ServiceState};
use crate::types::ServiceName;

/// Binary liveness signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Unhealthy,
}

pub struct HealthProber<'a> {
    supervisor: &'a dyn ProcessSupervisor,
    service: &'a ServiceName,
    settle: Duration,
    interval: Duration,
}

impl<'a> HealthProber<'a> {
    pub fn new(
        supervisor: &'a dyn ProcessSupervisor,
        service: &'a ServiceName,
        config: &HealthcheckConfig,
    ) -> Self {
        Self {
            supervisor,
            service,
            settle: config.settle,
            interval: config.interval,
        }
    }

    /// Query the supervisor once. Query errors count as unhealthy.
    pub async fn check(&self) -> Health {
        match self.supervisor.active_state(self.service).await {
            Ok(ServiceState::Active) => Health::Healthy,
            Ok(state) => {
                tracing::debug!("{} is {}", self.service, state);
                Health::Unhealthy
            }
            Err(e) => {
                tracing::warn!("Health query for {} failed: {}", self.service, e);
                Health::Unhealthy
            }
        }
    }

    /// Poll until healthy or `max_wait` has elapsed since the settle delay.
    ///
    /// Returns `false` on timeout. At least one check always runs.
    pub async fn wait_until_healthy(&self, max_wait: Duration) -> bool {
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        let start = Instant::now();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            if self.check().await == Health::Healthy {
                tracing::info!("{} healthy after {} check(s)", self.service, attempts);
                return true;
            }

            let elapsed = start.elapsed();
            if elapsed >= max_wait {
                tracing::warn!(
                    "{} not healthy after {:?} ({} checks)",
                    self.service,
                    max_wait,
                    attempts
                );
                return false;
            }

            tokio::time::sleep(self.interval.min(max_wait - elapsed)).await;
        }
    }
}
