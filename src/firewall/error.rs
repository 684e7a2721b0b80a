// ABOUTME: Firewall error types with SNAFU pattern.
// ABOUTME: Covers packet-filter commands, unparseable rule tables, lockout, and non-convergence.

use snafu::Snafu;
use std::net::IpAddr;

use crate::exec::ExecError;
use crate::lock::LockError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FirewallError {
    #[snafu(display("`{command}` failed: {message}"))]
    Command { command: String, message: String },

    #[snafu(display("could not run packet filter: {source}"))]
    Exec { source: ExecError },

    #[snafu(display("unrecognised rule table line: {line}"))]
    Parse { line: String },

    #[snafu(display(
        "your session comes from {address}, which is not in the allow-list; applying would lock you out"
    ))]
    LockoutRisk { address: IpAddr },

    #[snafu(display("rules for port {port} did not converge after {deletions} deletions"))]
    NotConverged { port: u16, deletions: usize },

    #[snafu(display("port {port} does not match the allow-list after reconciling: {detail}"))]
    Unverified { port: u16, detail: String },

    #[snafu(display("{source}"))]
    Lock { source: LockError },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirewallErrorKind {
    /// The packet filter rejected a command or could not be run.
    CommandFailed,
    /// `ufw status` output was not understood.
    Parse,
    /// The operator's own session would be cut off.
    LockoutRisk,
    /// Deleting rules kept turning up more rules to delete.
    NotConverged,
    /// Final rule set differs from the allow-list.
    Unverified,
    /// Another run holds the firewall lock.
    LockHeld,
}

impl FirewallError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> FirewallErrorKind {
        match self {
            FirewallError::Command { .. } | FirewallError::Exec { .. } => {
                FirewallErrorKind::CommandFailed
            }
            FirewallError::Parse { .. } => FirewallErrorKind::Parse,
            FirewallError::LockoutRisk { .. } => FirewallErrorKind::LockoutRisk,
            FirewallError::NotConverged { .. } => FirewallErrorKind::NotConverged,
            FirewallError::Unverified { .. } => FirewallErrorKind::Unverified,
            FirewallError::Lock { .. } => FirewallErrorKind::LockHeld,
        }
    }

    pub fn recovery_hint(&self) -> Option<String> {
        match self {
            FirewallError::Command { .. } | FirewallError::Exec { .. } => Some(
                "check that ufw is installed and, with firewall.sudo, that `sudo -n ufw` works"
                    .to_string(),
            ),
            FirewallError::LockoutRisk { address } => Some(format!(
                "add {address} to firewall.allow, or re-run with --yes if you have console access"
            )),
            FirewallError::NotConverged { .. } | FirewallError::Unverified { .. } => Some(
                "inspect `ufw status numbered` and remove the stray rules by hand".to_string(),
            ),
            FirewallError::Lock { source } => Some(source.recovery_hint()),
            FirewallError::Parse { .. } => None,
        }
    }
}

impl From<LockError> for FirewallError {
    fn from(source: LockError) -> Self {
        FirewallError::Lock { source }
    }
}
