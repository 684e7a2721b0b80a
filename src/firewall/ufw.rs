// ABOUTME: ufw-backed PacketFilter and the parser for `ufw status numbered`.
// ABOUTME: Rules the parser cannot tie to a single port are left out of the table.

use async_trait::async_trait;
use snafu::ResultExt;
use std::net::IpAddr;
use std::time::Duration;

use crate::exec::{CommandOutput, CommandSpec};
use crate::types::Protocol;

use super::PacketFilter;
use super::error::{CommandSnafu, ExecSnafu, FirewallError, ParseSnafu};
use super::rule::{AddressFamily, FirewallRule, RuleAction, RuleTable, SourceScope};

#[derive(Debug, Clone)]
pub struct UfwPacketFilter {
    sudo: bool,
    timeout: Duration,
}

impl UfwPacketFilter {
    pub fn new(sudo: bool) -> Self {
        Self {
            sudo,
            timeout: Duration::from_secs(30),
        }
    }

    async fn ufw<I, S>(&self, args: I) -> Result<CommandOutput, FirewallError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let spec = CommandSpec::privileged("ufw", self.sudo)
            .args(args)
            .timeout(self.timeout);
        let output = spec.run().await.context(ExecSnafu)?;
        if !output.success() {
            return CommandSnafu {
                command: spec.display(),
                message: output.summary(),
            }
            .fail();
        }
        Ok(output)
    }
}

#[async_trait]
impl PacketFilter for UfwPacketFilter {
    async fn rules(&self) -> Result<RuleTable, FirewallError> {
        let output = self.ufw(["status", "numbered"]).await?;
        parse_status_numbered(&output.stdout)
    }

    async fn delete(&self, number: usize) -> Result<(), FirewallError> {
        self.ufw(["--force".to_string(), "delete".to_string(), number.to_string()])
            .await?;
        Ok(())
    }

    async fn allow(&self, source: IpAddr, port: u16, protocol: Protocol) -> Result<(), FirewallError> {
        self.ufw([
            "allow".to_string(),
            "from".to_string(),
            source.to_string(),
            "to".to_string(),
            "any".to_string(),
            "port".to_string(),
            port.to_string(),
            "proto".to_string(),
            protocol.to_string(),
        ])
        .await?;
        Ok(())
    }
}

/// Parse `ufw status numbered`.
///
/// ```text
/// Status: active
///
///      To                         Action      From
///      --                         ------      ----
/// [ 1] 22/tcp                     ALLOW IN    Anywhere
/// [ 2] 5601/tcp                   ALLOW IN    203.0.113.10
/// [ 3] 22/tcp (v6)                ALLOW IN    Anywhere (v6)
/// ```
pub fn parse_status_numbered(output: &str) -> Result<RuleTable, FirewallError> {
    let mut table = RuleTable::default();

    for line in output.lines() {
        let trimmed = line.trim();
        if let Some(status) = trimmed.strip_prefix("Status:") {
            table.active = status.trim() == "active";
            continue;
        }
        if !trimmed.starts_with('[') {
            continue;
        }
        if let Some(rule) = parse_rule_line(trimmed)? {
            table.rules.push(rule);
        }
    }

    Ok(table)
}

/// `Ok(None)` for rules that are well-formed but not single-port inbound rules.
fn parse_rule_line(line: &str) -> Result<Option<FirewallRule>, FirewallError> {
    let malformed = || ParseSnafu { line }.build();

    let rest = line.strip_prefix('[').ok_or_else(malformed)?;
    let (number, rest) = rest.split_once(']').ok_or_else(malformed)?;
    let number: usize = number.trim().parse().map_err(|_| malformed())?;

    // Drop a trailing `# comment`.
    let body = rest.split(" # ").next().unwrap_or(rest);

    // Column widths shift with long IPv6 addresses, so split on the
    // action keyword rather than on runs of spaces.
    let words: Vec<&str> = body.split_whitespace().collect();
    let at = words
        .iter()
        .position(|w| action_keyword(w).is_some())
        .ok_or_else(malformed)?;
    let action = action_keyword(words[at]).ok_or_else(malformed)?;
    let mut from_at = at + 1;
    match words.get(from_at).copied() {
        Some("OUT") | Some("FWD") => return Ok(None),
        Some("IN") => from_at += 1,
        _ => {}
    }
    if at == 0 || from_at >= words.len() {
        return Err(malformed());
    }
    let to = words[..at].join(" ");
    let from = words[from_at..].join(" ");

    let (to, to_v6) = strip_v6(&to);
    let (from, from_v6) = strip_v6(&from);

    // `5601/tcp`, `5601`, or `10.0.0.1 5601/tcp`; ranges, lists and app
    // profiles are not single-port rules.
    let Some(port_spec) = to.split_whitespace().last() else {
        return Ok(None);
    };
    let (port, protocol) = match port_spec.split_once('/') {
        Some((port, proto)) => match proto.parse::<Protocol>() {
            Ok(protocol) => (port, Some(protocol)),
            Err(_) => return Ok(None),
        },
        None => (port_spec, None),
    };
    let Ok(port) = port.parse::<u16>() else {
        tracing::debug!("Skipping rule without a single port: {}", line);
        return Ok(None);
    };

    let source = if from == "Anywhere" {
        SourceScope::Any
    } else {
        match from.parse::<IpAddr>() {
            Ok(addr) => SourceScope::Address(addr),
            Err(_) => SourceScope::Other(from.to_string()),
        }
    };

    let family = match &source {
        SourceScope::Address(IpAddr::V6(_)) => AddressFamily::V6,
        SourceScope::Address(IpAddr::V4(_)) => AddressFamily::V4,
        _ if to_v6 || from_v6 => AddressFamily::V6,
        _ => AddressFamily::V4,
    };

    Ok(Some(FirewallRule {
        number,
        port,
        protocol,
        action,
        source,
        family,
    }))
}

/// Upper-case `ALLOW`, `DENY`, `REJECT` or `LIMIT`; ufw never prints them otherwise.
fn action_keyword(word: &str) -> Option<RuleAction> {
    if word.bytes().any(|b| b.is_ascii_lowercase()) {
        return None;
    }
    RuleAction::parse(word)
}

fn strip_v6(column: &str) -> (&str, bool) {
    match column.strip_suffix("(v6)") {
        Some(rest) => (rest.trim_end(), true),
        None => (column, false),
    }
}
