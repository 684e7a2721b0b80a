// ABOUTME: Firewall allow-list configuration for one managed port.
// ABOUTME: The allow-list must name at least one address.

use super::deserialize::deserialize_allow_list;
use crate::types::Protocol;
use nonempty::NonEmpty;
use serde::Deserialize;
use std::net::IpAddr;

#[derive(Debug, Clone, Deserialize)]
pub struct FirewallConfig {
    pub port: u16,

    #[serde(default)]
    pub protocol: Protocol,

    #[serde(deserialize_with = "deserialize_allow_list")]
    pub allow: NonEmpty<IpAddr>,

    /// Run ufw through `sudo -n`.
    #[serde(default)]
    pub sudo: bool,
}
