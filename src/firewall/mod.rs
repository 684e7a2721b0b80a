// ABOUTME: Firewall reconciler: drives one port's inbound rules to a declared allow-list.
// ABOUTME: The rule table is reached through the PacketFilter capability (ufw on real hosts).

mod error;
mod lockout;
mod reconcile;
mod rule;
mod ufw;

use async_trait::async_trait;
use std::net::IpAddr;

use crate::types::Protocol;

pub use error::{FirewallError, FirewallErrorKind};
pub use lockout::{LockoutGuard, session_address_from_env};
pub use reconcile::{
    AddressStatus, FIREWALL_LOCK, ReconcileReport, next_removal, reconcile, reconcile_locked,
};
pub use rule::{AddressFamily, FirewallRule, RuleAction, RuleTable, SourceScope};
pub use ufw::{UfwPacketFilter, parse_status_numbered};

/// Host inbound rule table.
///
/// Rule numbers are positions: `delete` shifts every later rule down by one,
/// so callers re-read the table after each deletion.
#[async_trait]
pub trait PacketFilter: Send + Sync {
    async fn rules(&self) -> Result<RuleTable, FirewallError>;

    async fn delete(&self, number: usize) -> Result<(), FirewallError>;

    async fn allow(&self, source: IpAddr, port: u16, protocol: Protocol)
    -> Result<(), FirewallError>;
}
