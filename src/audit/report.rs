// ABOUTME: Audit findings and the report whose issue count becomes the exit code.
// ABOUTME: Findings are kept in ascending port order.

use serde::Serialize;
use std::fmt;
use std::net::IpAddr;

use super::probe::PortState;

/// Exit code when the audit could not run at all, e.g. the host did not
/// resolve. Issue counts stop one below it.
pub const AUDIT_FAILED_EXIT: u8 = u8::MAX;

/// Whether a port should answer from outside the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectedState {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortExpectation {
    pub port: u16,
    pub expected: ExpectedState,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub port: u16,
    pub label: String,
    pub expected: ExpectedState,
    pub observed: PortState,
}

impl Finding {
    pub fn is_issue(&self) -> bool {
        !matches!(
            (self.expected, self.observed),
            (ExpectedState::Open, PortState::Open) | (ExpectedState::Closed, PortState::Closed)
        )
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = match (self.expected, self.observed) {
            (ExpectedState::Open, PortState::Open) => "open",
            (ExpectedState::Closed, PortState::Closed) => "closed",
            (ExpectedState::Closed, PortState::Open) => "open [unexpected]",
            (ExpectedState::Open, PortState::Closed) => "closed [expected open]",
        };
        write!(f, "{:>5}  {:<24} {}", self.port, self.label, verdict)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub host: String,
    pub address: IpAddr,
    pub findings: Vec<Finding>,
}

impl AuditReport {
    pub fn new(host: String, address: IpAddr, mut findings: Vec<Finding>) -> Self {
        findings.sort_by_key(|f| f.port);
        Self {
            host,
            address,
            findings,
        }
    }

    pub fn issues(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.is_issue())
    }

    pub fn issue_count(&self) -> usize {
        self.issues().count()
    }

    pub fn is_compliant(&self) -> bool {
        self.issue_count() == 0
    }

    /// The issue count, saturated below [`AUDIT_FAILED_EXIT`] so that 256
    /// issues never exit 0 and never read as a failed audit.
    pub fn exit_code(&self) -> u8 {
        u8::try_from(self.issue_count())
            .unwrap_or(u8::MAX)
            .min(AUDIT_FAILED_EXIT - 1)
    }
}
