// ABOUTME: Out-of-band exposure audit: confirms only the intended ports answer on a host.
// ABOUTME: Read-only; resolves the host once, then probes every expected port concurrently.

mod probe;
mod report;

use futures::{StreamExt, stream};
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

pub use probe::{PortProbe, PortState, TcpProbe};
pub use report::{AUDIT_FAILED_EXIT, AuditReport, ExpectedState, Finding, PortExpectation};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("could not resolve {host}: {message}")]
    ResolutionFailure { host: String, message: String },
}

impl AuditError {
    pub fn recovery_hint(&self) -> String {
        match self {
            AuditError::ResolutionFailure { .. } => {
                "check audit.host and that this machine can resolve it".to_string()
            }
        }
    }
}

/// Resolve `host` to the first address it yields.
pub async fn resolve(host: &str) -> Result<IpAddr, AuditError> {
    if let Ok(addr) = host.parse::<IpAddr>() {
        return Ok(addr);
    }
    let failure = |message: String| AuditError::ResolutionFailure {
        host: host.to_string(),
        message,
    };
    let mut addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| failure(e.to_string()))?;
    addrs
        .next()
        .map(|sa| sa.ip())
        .ok_or_else(|| failure("no addresses returned".to_string()))
}

/// Probe every expected port on `host`, at most `concurrency` at a time.
pub async fn audit(
    probe: &dyn PortProbe,
    host: &str,
    expected_open: &[PortExpectation],
    expected_closed: &[PortExpectation],
    timeout: Duration,
    concurrency: usize,
) -> Result<AuditReport, AuditError> {
    let address = resolve(host).await?;
    tracing::info!("Auditing {} ({})", host, address);

    let findings = stream::iter(expected_open.iter().chain(expected_closed))
        .map(|expectation| async move {
            let observed = probe.probe(address, expectation.port, timeout).await;
            Finding {
                port: expectation.port,
                label: expectation.label.clone(),
                expected: expectation.expected,
                observed,
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    Ok(AuditReport::new(host.to_string(), address, findings))
}
