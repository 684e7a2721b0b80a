// ABOUTME: Firewall rule model shared by the packet filter and the reconciler.
// ABOUTME: A rule is (protocol, port, source scope) plus its table position and action.

use serde::Serialize;
use std::fmt;
use std::net::IpAddr;

use crate::types::Protocol;

/// Where a rule admits traffic from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceScope {
    /// `Anywhere` or `Anywhere (v6)`.
    Any,
    Address(IpAddr),
    /// A network or anything else that is not a single address.
    Other(String),
}

impl fmt::Display for SourceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceScope::Any => f.write_str("anywhere"),
            SourceScope::Address(addr) => write!(f, "{addr}"),
            SourceScope::Other(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Allow,
    Deny,
    Reject,
    Limit,
}

impl RuleAction {
    pub fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "ALLOW" => Some(RuleAction::Allow),
            "DENY" => Some(RuleAction::Deny),
            "REJECT" => Some(RuleAction::Reject),
            "LIMIT" => Some(RuleAction::Limit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    V4,
    V6,
}

/// One inbound rule as enumerated from the rule table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FirewallRule {
    /// 1-based position; deleting any rule renumbers those after it.
    pub number: usize,
    pub port: u16,
    /// `None` for rules that apply to both protocols.
    pub protocol: Option<Protocol>,
    pub action: RuleAction,
    pub source: SourceScope,
    pub family: AddressFamily,
}

impl FirewallRule {
    /// Whether this rule governs `port` for `protocol`.
    pub fn governs(&self, port: u16, protocol: Protocol) -> bool {
        self.port == port && self.protocol.is_none_or(|p| p == protocol)
    }

    /// An allow rule for exactly this address, port and protocol.
    pub fn is_exact_allow(&self, address: IpAddr, port: u16, protocol: Protocol) -> bool {
        self.port == port
            && self.protocol == Some(protocol)
            && self.action == RuleAction::Allow
            && self.source == SourceScope::Address(address)
    }
}

impl fmt::Display for FirewallRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {:?} {}", self.number, self.action, self.port)?;
        if let Some(protocol) = self.protocol {
            write!(f, "/{protocol}")?;
        }
        write!(f, " from {}", self.source)?;
        if self.family == AddressFamily::V6 {
            f.write_str(" (v6)")?;
        }
        Ok(())
    }
}

/// The full inbound rule table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleTable {
    /// Whether the filter is enforcing rules at all.
    pub active: bool,
    pub rules: Vec<FirewallRule>,
}

impl RuleTable {
    /// Rules that govern `port` for `protocol`, in table order.
    pub fn governing(&self, port: u16, protocol: Protocol) -> Vec<&FirewallRule> {
        self.rules
            .iter()
            .filter(|r| r.governs(port, protocol))
            .collect()
    }
}
