// ABOUTME: Guard against reconciling away the operator's own SSH access.
// ABOUTME: Reads the session source address from SSH_CONNECTION or SSH_CLIENT.

use nonempty::NonEmpty;
use std::net::IpAddr;

use super::error::FirewallError;

/// Source address of the current SSH session, if there is one.
///
/// `SSH_CONNECTION` is `client_ip client_port server_ip server_port`;
/// `SSH_CLIENT` is `client_ip client_port server_port`.
pub fn session_address_from_env() -> Option<IpAddr> {
    ["SSH_CONNECTION", "SSH_CLIENT"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find_map(|value| parse_session_address(&value))
}

fn parse_session_address(value: &str) -> Option<IpAddr> {
    value
        .split_whitespace()
        .next()?
        .parse::<IpAddr>()
        .ok()
        .map(|addr| addr.to_canonical())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LockoutGuard {
    session: Option<IpAddr>,
    confirmed: bool,
}

impl LockoutGuard {
    pub fn new(session: Option<IpAddr>, confirmed: bool) -> Self {
        Self { session, confirmed }
    }

    pub fn from_env(confirmed: bool) -> Self {
        Self::new(session_address_from_env(), confirmed)
    }

    pub fn session(&self) -> Option<IpAddr> {
        self.session
    }

    /// The session address when it is known and not allow-listed.
    pub fn at_risk(&self, allow: &NonEmpty<IpAddr>) -> Option<IpAddr> {
        self.session.filter(|addr| !allow.iter().any(|a| a == addr))
    }

    /// Err(`LockoutRisk`) unless the session is safe or the operator confirmed.
    /// Returns the overridden address when a confirmation was needed.
    pub fn check(&self, allow: &NonEmpty<IpAddr>) -> Result<Option<IpAddr>, FirewallError> {
        match self.at_risk(allow) {
            None => Ok(None),
            Some(address) if self.confirmed => {
                tracing::warn!(
                    "Session address {} is not allow-listed; continuing on operator confirmation",
                    address
                );
                Ok(Some(address))
            }
            Some(address) => Err(FirewallError::LockoutRisk { address }),
        }
    }
}
