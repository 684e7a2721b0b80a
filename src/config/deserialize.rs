// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Handles the firewall allow-list and port expectation entries.

use nonempty::NonEmpty;
use serde::Deserialize;
use std::net::IpAddr;

use super::audit::PortEntry;

pub fn deserialize_allow_list<'de, D>(deserializer: D) -> Result<NonEmpty<IpAddr>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<String> = Vec::deserialize(deserializer)?;
    let mut addresses: Vec<IpAddr> = Vec::with_capacity(values.len());
    for value in values {
        let addr: IpAddr = value
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid IP address: {}", value)))?;
        if addresses.contains(&addr) {
            return Err(serde::de::Error::custom(format!(
                "duplicate address in allow list: {}",
                addr
            )));
        }
        addresses.push(addr);
    }

    NonEmpty::from_vec(addresses)
        .ok_or_else(|| serde::de::Error::custom("allow list needs at least one address"))
}

pub fn deserialize_port_entries<'de, D>(deserializer: D) -> Result<Vec<PortEntry>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<PortEntryRepr> = Vec::deserialize(deserializer)?;
    Ok(values.into_iter().map(PortEntryRepr::into_entry).collect())
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PortEntryRepr {
    Bare(u16),
    Labeled {
        port: u16,
        #[serde(default)]
        label: Option<String>,
    },
}

impl PortEntryRepr {
    fn into_entry(self) -> PortEntry {
        match self {
            PortEntryRepr::Bare(port) => PortEntry { port, label: None },
            PortEntryRepr::Labeled { port, label } => PortEntry { port, label },
        }
    }
}
