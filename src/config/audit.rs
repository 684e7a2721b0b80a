// ABOUTME: Exposure audit configuration.
// ABOUTME: Target host, probe timeout, concurrency cap, and expected port sets.

use super::deserialize::deserialize_port_entries;
use crate::audit::{ExpectedState, PortExpectation};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    pub host: String,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default, deserialize_with = "deserialize_port_entries")]
    pub open: Vec<PortEntry>,

    #[serde(default, deserialize_with = "deserialize_port_entries")]
    pub closed: Vec<PortEntry>,
}

/// A port with an optional human label, e.g. `{port: 22, label: SSH}` or `22`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortEntry {
    pub port: u16,
    pub label: Option<String>,
}

fn default_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_concurrency() -> usize {
    16
}

impl AuditConfig {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::InvalidConfig(
                "audit.concurrency must be at least 1".to_string(),
            ));
        }
        if let Some(entry) = self
            .open
            .iter()
            .find(|o| self.closed.iter().any(|c| c.port == o.port))
        {
            return Err(Error::InvalidConfig(format!(
                "port {} is listed as both open and closed",
                entry.port
            )));
        }
        Ok(())
    }

    pub fn expected_open(&self) -> Vec<PortExpectation> {
        to_expectations(&self.open, ExpectedState::Open)
    }

    pub fn expected_closed(&self) -> Vec<PortExpectation> {
        to_expectations(&self.closed, ExpectedState::Closed)
    }
}

fn to_expectations(entries: &[PortEntry], expected: ExpectedState) -> Vec<PortExpectation> {
    entries
        .iter()
        .map(|e| PortExpectation {
            port: e.port,
            expected,
            label: e.label.clone().unwrap_or_else(|| format!("port {}", e.port)),
        })
        .collect()
}
