// ABOUTME: Converges one port's inbound rules to an exact allow-list, from any starting state.
// ABOUTME: Deletes by re-scanning after every removal because deletion renumbers the table.

use nonempty::NonEmpty;
use serde::Serialize;
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::Path;

use crate::lock::HostLock;
use crate::types::Protocol;

use super::PacketFilter;
use super::error::FirewallError;
use super::lockout::LockoutGuard;
use super::rule::{FirewallRule, RuleAction, RuleTable, SourceScope};

/// Lock scope held for the duration of one reconcile.
pub const FIREWALL_LOCK: &str = "firewall";

/// Extra deletions allowed beyond the initial rule count before giving up.
const DELETION_SLACK: usize = 4;

/// Per-address result of the final verification pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressStatus {
    pub address: IpAddr,
    /// Exact allow rules found; compliant when exactly one.
    pub rules: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub port: u16,
    pub protocol: Protocol,
    pub removed: Vec<FirewallRule>,
    pub added: Vec<IpAddr>,
    pub addresses: Vec<AddressStatus>,
    /// An `Anywhere` rule still governs the port.
    pub any_scope_remaining: bool,
    /// Rules still governing the port that are not exact allow-list rules.
    pub stray_remaining: usize,
    /// Whether the filter is enforcing rules at all.
    pub filter_active: bool,
    /// Session address the operator chose to cut off.
    pub lockout_override: Option<IpAddr>,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        !self.removed.is_empty() || !self.added.is_empty()
    }

    pub fn is_compliant(&self) -> bool {
        !self.any_scope_remaining
            && self.stray_remaining == 0
            && self.addresses.iter().all(|a| a.rules == 1)
    }

    /// Why the report is not compliant, for error messages.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.any_scope_remaining {
            problems.push("an Anywhere rule remains".to_string());
        }
        if self.stray_remaining > 0 {
            problems.push(format!("{} stray rule(s) remain", self.stray_remaining));
        }
        for status in self.addresses.iter().filter(|a| a.rules != 1) {
            problems.push(format!("{} has {} matching rule(s)", status.address, status.rules));
        }
        problems
    }
}

/// The first rule that must go for `port`/`protocol` to match `allow`
/// exactly, or `None` when only exact, unique allow rules remain.
///
/// Removes `Any`-scoped rules, sources outside the allow-list, non-allow
/// actions, rules that are not protocol-specific, and every copy of an
/// address's rule after the first.
pub fn next_removal<'t>(
    table: &'t RuleTable,
    port: u16,
    protocol: Protocol,
    allow: &NonEmpty<IpAddr>,
) -> Option<&'t FirewallRule> {
    let mut kept = HashSet::new();
    for rule in table.governing(port, protocol) {
        let keep = match &rule.source {
            SourceScope::Address(addr) => {
                allow.iter().any(|a| a == addr)
                    && rule.action == RuleAction::Allow
                    && rule.protocol == Some(protocol)
                    && kept.insert(*addr)
            }
            SourceScope::Any | SourceScope::Other(_) => false,
        };
        if !keep {
            return Some(rule);
        }
    }
    None
}

/// Bring the rules governing `port`/`protocol` to exactly one allow rule
/// per address in `allow` and nothing else.
///
/// Idempotent: a second run against the result changes nothing.
///
/// # Errors
///
/// `LockoutRisk` before any change when the guard refuses,
/// `NotConverged` if deletions keep turning up more rules to delete,
/// `Unverified` if the final table still differs from the allow-list.
/// Packet-filter failures pass through.
pub async fn reconcile(
    filter: &dyn PacketFilter,
    port: u16,
    protocol: Protocol,
    allow: &NonEmpty<IpAddr>,
    guard: &LockoutGuard,
) -> Result<ReconcileReport, FirewallError> {
    let lockout_override = guard.check(allow)?;

    let mut table = filter.rules().await?;
    let max_deletions = table.governing(port, protocol).len() + DELETION_SLACK;
    let mut removed = Vec::new();

    while let Some(rule) = next_removal(&table, port, protocol, allow) {
        if removed.len() >= max_deletions {
            return Err(FirewallError::NotConverged {
                port,
                deletions: removed.len(),
            });
        }
        let rule = rule.clone();
        tracing::info!("Removing {}", rule);
        filter.delete(rule.number).await?;
        removed.push(rule);
        table = filter.rules().await?;
    }

    let mut added = Vec::new();
    for &address in allow.iter() {
        let present = table
            .rules
            .iter()
            .any(|r| r.is_exact_allow(address, port, protocol));
        if !present {
            tracing::info!("Allowing {} on {}/{}", address, port, protocol);
            filter.allow(address, port, protocol).await?;
            added.push(address);
        }
    }

    let table = filter.rules().await?;
    let mut report = verify(&table, port, protocol, allow, removed, added);
    report.lockout_override = lockout_override;
    if !report.is_compliant() {
        return Err(FirewallError::Unverified {
            port,
            detail: report.problems().join("; "),
        });
    }
    if !report.filter_active {
        tracing::warn!("Packet filter is inactive; rules are stored but not enforced");
    }
    Ok(report)
}

/// [`reconcile`] while holding `<state_dir>/firewall.lock`.
pub async fn reconcile_locked(
    state_dir: &Path,
    force: bool,
    filter: &dyn PacketFilter,
    port: u16,
    protocol: Protocol,
    allow: &NonEmpty<IpAddr>,
    guard: &LockoutGuard,
) -> Result<ReconcileReport, FirewallError> {
    HostLock::with_lock(state_dir, FIREWALL_LOCK, force, async {
        reconcile(filter, port, protocol, allow, guard).await
    })
    .await
}

fn verify(
    table: &RuleTable,
    port: u16,
    protocol: Protocol,
    allow: &NonEmpty<IpAddr>,
    removed: Vec<FirewallRule>,
    added: Vec<IpAddr>,
) -> ReconcileReport {
    let governing = table.governing(port, protocol);
    let addresses = allow
        .iter()
        .map(|&address| AddressStatus {
            address,
            rules: governing
                .iter()
                .filter(|r| r.is_exact_allow(address, port, protocol))
                .count(),
        })
        .collect();
    let stray_remaining = governing
        .iter()
        .filter(|r| !allow.iter().any(|&a| r.is_exact_allow(a, port, protocol)))
        .count();

    ReconcileReport {
        port,
        protocol,
        removed,
        added,
        addresses,
        any_scope_remaining: governing.iter().any(|r| r.source == SourceScope::Any),
        stray_remaining,
        filter_active: table.active,
        lockout_override: None,
    }
}
