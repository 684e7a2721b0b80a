// ABOUTME: Test support utilities.
// ABOUTME: In-memory fakes for the supervisor, gate, packet filter and port probe, plus a host fixture.

#![allow(dead_code)]

use async_trait::async_trait;
use safeship::audit::{PortProbe, PortState};
use safeship::config::HealthcheckConfig;
use safeship::exec::{CommandOutput, ExecError};
use safeship::firewall::{
    AddressFamily, FirewallError, FirewallRule, PacketFilter, RuleAction, RuleTable, SourceScope,
};
use safeship::release::{ReleaseObserver, ReleasePhase, TestGate};
use safeship::supervisor::{ProcessSupervisor, ServiceState, SupervisorError};
use safeship::types::{Protocol, Revision, ServiceName};
use std::collections::HashSet;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use std::time::Duration;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("safeship=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn service() -> ServiceName {
    ServiceName::new("app.service").unwrap()
}

pub fn rev(tag: &str) -> Revision {
    Revision::parse(tag).unwrap()
}

/// Health settings that keep tests fast.
pub fn fast_health() -> HealthcheckConfig {
    HealthcheckConfig {
        settle: Duration::ZERO,
        interval: Duration::from_millis(5),
        timeout: Duration::from_millis(60),
    }
}

pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (path, content) in files {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
}

pub fn read(root: &Path, path: &str) -> String {
    fs::read_to_string(root.join(path)).unwrap()
}

// =============================================================================
// Process supervisor
// =============================================================================

/// Supervisor whose behaviour is scripted per restart.
///
/// `states[n]` is the state reported after the n-th restart (0 = before any
/// restart); the last entry repeats.
pub struct ScriptedSupervisor {
    states: Vec<ServiceState>,
    failing_restarts: Vec<usize>,
    restarts: AtomicUsize,
    queries: AtomicUsize,
}

impl ScriptedSupervisor {
    pub fn new(states: Vec<ServiceState>) -> Self {
        assert!(!states.is_empty());
        Self {
            states,
            failing_restarts: Vec::new(),
            restarts: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
        }
    }

    /// Always active.
    pub fn healthy() -> Self {
        Self::new(vec![ServiceState::Active])
    }

    /// Restart number `n` (1-based) fails.
    pub fn failing_restart(mut self, n: usize) -> Self {
        self.failing_restarts.push(n);
        self
    }

    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessSupervisor for ScriptedSupervisor {
    async fn restart(&self, service: &ServiceName) -> Result<(), SupervisorError> {
        let n = self.restarts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_restarts.contains(&n) {
            return Err(SupervisorError::RestartFailed {
                service: service.to_string(),
                message: "Job for app.service failed".to_string(),
            });
        }
        Ok(())
    }

    async fn active_state(&self, _service: &ServiceName) -> Result<ServiceState, SupervisorError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let n = self.restarts.load(Ordering::SeqCst);
        Ok(self.states[n.min(self.states.len() - 1)])
    }
}

/// Supervisor whose queries always fail.
pub struct BrokenSupervisor;

#[async_trait]
impl ProcessSupervisor for BrokenSupervisor {
    async fn restart(&self, _service: &ServiceName) -> Result<(), SupervisorError> {
        Ok(())
    }

    async fn active_state(&self, _service: &ServiceName) -> Result<ServiceState, SupervisorError> {
        Err(SupervisorError::QueryFailed("bus unavailable".to_string()))
    }
}

// =============================================================================
// Test gate
// =============================================================================

pub struct FakeGate {
    exit_code: i32,
    runs: Mutex<Vec<(String, PathBuf)>>,
}

impl FakeGate {
    pub fn passing() -> Self {
        Self {
            exit_code: 0,
            runs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            exit_code: 1,
            runs: Mutex::new(Vec::new()),
        }
    }

    /// Revisions the gate was run for, in order.
    pub fn runs(&self) -> Vec<String> {
        self.runs.lock().unwrap().iter().map(|(r, _)| r.clone()).collect()
    }

    pub fn workdirs(&self) -> Vec<PathBuf> {
        self.runs.lock().unwrap().iter().map(|(_, d)| d.clone()).collect()
    }
}

#[async_trait]
impl TestGate for FakeGate {
    async fn run(&self, revision: &Revision, workdir: &Path) -> Result<CommandOutput, ExecError> {
        self.runs
            .lock()
            .unwrap()
            .push((revision.to_string(), workdir.to_path_buf()));
        Ok(CommandOutput {
            exit_code: Some(self.exit_code),
            stdout: String::new(),
            stderr: if self.exit_code == 0 {
                String::new()
            } else {
                "1 failed, 41 passed".to_string()
            },
        })
    }
}

// =============================================================================
// Release observer
// =============================================================================

#[derive(Default)]
pub struct RecordingObserver {
    phases: Mutex<Vec<ReleasePhase>>,
}

impl RecordingObserver {
    pub fn phases(&self) -> Vec<ReleasePhase> {
        self.phases.lock().unwrap().clone()
    }
}

impl ReleaseObserver for RecordingObserver {
    fn phase(&self, phase: ReleasePhase) {
        self.phases.lock().unwrap().push(phase);
    }
}

// =============================================================================
// Packet filter
// =============================================================================

/// One stored rule; its number is its position in the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRule {
    pub port: u16,
    pub protocol: Option<Protocol>,
    pub action: RuleAction,
    pub source: SourceScope,
}

impl StoredRule {
    pub fn allow(port: u16, protocol: Protocol, source: &str) -> Self {
        Self {
            port,
            protocol: Some(protocol),
            action: RuleAction::Allow,
            source: SourceScope::Address(source.parse().unwrap()),
        }
    }

    pub fn any(port: u16, protocol: Option<Protocol>) -> Self {
        Self {
            port,
            protocol,
            action: RuleAction::Allow,
            source: SourceScope::Any,
        }
    }
}

/// In-memory rule table that renumbers on delete like ufw does.
#[derive(Default)]
pub struct MemoryPacketFilter {
    rules: Mutex<Vec<StoredRule>>,
    inactive: bool,
    deletes: AtomicUsize,
    adds: AtomicUsize,
}

impl MemoryPacketFilter {
    pub fn with_rules(rules: Vec<StoredRule>) -> Self {
        Self {
            rules: Mutex::new(rules),
            ..Default::default()
        }
    }

    pub fn inactive(mut self) -> Self {
        self.inactive = true;
        self
    }

    pub fn snapshot(&self) -> Vec<StoredRule> {
        self.rules.lock().unwrap().clone()
    }

    pub fn mutations(&self) -> usize {
        self.deletes.load(Ordering::SeqCst) + self.adds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PacketFilter for MemoryPacketFilter {
    async fn rules(&self) -> Result<RuleTable, FirewallError> {
        let rules = self
            .rules
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(i, r)| FirewallRule {
                number: i + 1,
                port: r.port,
                protocol: r.protocol,
                action: r.action,
                source: r.source.clone(),
                family: match r.source {
                    SourceScope::Address(IpAddr::V6(_)) => AddressFamily::V6,
                    _ => AddressFamily::V4,
                },
            })
            .collect();
        Ok(RuleTable {
            active: !self.inactive,
            rules,
        })
    }

    async fn delete(&self, number: usize) -> Result<(), FirewallError> {
        let mut rules = self.rules.lock().unwrap();
        if number == 0 || number > rules.len() {
            return Err(FirewallError::Command {
                command: format!("ufw --force delete {number}"),
                message: "Could not delete non-existent rule".to_string(),
            });
        }
        rules.remove(number - 1);
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn allow(&self, source: IpAddr, port: u16, protocol: Protocol) -> Result<(), FirewallError> {
        self.rules.lock().unwrap().push(StoredRule {
            port,
            protocol: Some(protocol),
            action: RuleAction::Allow,
            source: SourceScope::Address(source),
        });
        self.adds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Port probe
// =============================================================================

/// Probe that reports a fixed set of ports as open.
pub struct FakeProbe {
    open: HashSet<u16>,
    probed: Mutex<Vec<u16>>,
}

impl FakeProbe {
    pub fn open(ports: &[u16]) -> Self {
        Self {
            open: ports.iter().copied().collect(),
            probed: Mutex::new(Vec::new()),
        }
    }

    pub fn probed(&self) -> Vec<u16> {
        self.probed.lock().unwrap().clone()
    }
}

#[async_trait]
impl PortProbe for FakeProbe {
    async fn probe(&self, _address: IpAddr, port: u16, _timeout: Duration) -> PortState {
        // Later ports answer first so ordering is exercised.
        tokio::time::sleep(Duration::from_millis(u64::from(100 - port % 100) / 10)).await;
        self.probed.lock().unwrap().push(port);
        if self.open.contains(&port) {
            PortState::Open
        } else {
            PortState::Closed
        }
    }
}

// =============================================================================
// Host fixture
// =============================================================================

/// Temp directories laid out like a host: live tree, backups, state and
/// per-tag release directories.
pub struct HostDirs {
    _root: tempfile::TempDir,
    pub app: PathBuf,
    pub backups: PathBuf,
    pub state: PathBuf,
    pub releases: PathBuf,
}

impl HostDirs {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let dirs = Self {
            app: root.path().join("app"),
            backups: root.path().join("backups"),
            state: root.path().join("state"),
            releases: root.path().join("releases"),
            _root: root,
        };
        fs::create_dir_all(&dirs.app).unwrap();
        fs::create_dir_all(&dirs.releases).unwrap();
        dirs
    }

    /// Unpack a release for `tag` with the given files.
    pub fn add_release(&self, tag: &str, files: &[(&str, &str)]) {
        write_tree(&self.releases.join(tag), files);
    }
}
