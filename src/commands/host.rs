// ABOUTME: Builds the real host capabilities (systemctl, tar.gz store, git or directory updater).
// ABOUTME: Commands borrow a ReleaseContext from here for one run.

use safeship::config::Config;
use safeship::error::Result;
use safeship::output::Output;
use safeship::release::{
    CommandGate, DependencySync, LogObserver, ReleaseContext, ReleaseLedger, ReleaseObserver,
    ReleasePhase, TreeUpdater, updater_for,
};
use safeship::snapshot::{SnapshotStore, TarGzArchiveStore};
use safeship::supervisor::SystemctlSupervisor;

pub struct Host {
    pub config: Config,
    pub archive: TarGzArchiveStore,
    pub supervisor: SystemctlSupervisor,
    pub gate: CommandGate,
    pub updater: Box<dyn TreeUpdater>,
    pub dependencies: Option<DependencySync>,
    pub ledger: ReleaseLedger,
}

impl Host {
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            archive: TarGzArchiveStore::new(&config.backup_dir),
            supervisor: SystemctlSupervisor::new(config.supervisor.sudo),
            gate: CommandGate::from_config(&config.gate, &config.app_dir)?,
            updater: updater_for(&config.source),
            dependencies: config.dependencies.as_ref().map(DependencySync::new),
            ledger: ReleaseLedger::new(config.state_dir()),
            config,
        })
    }

    pub fn snapshots(&self) -> SnapshotStore<'_> {
        SnapshotStore::new(&self.archive, &self.config.app_dir, self.config.retention)
    }

    pub fn context<'a>(
        &'a self,
        snapshots: &'a SnapshotStore<'a>,
        observer: &'a dyn ReleaseObserver,
    ) -> ReleaseContext<'a> {
        ReleaseContext {
            service: &self.config.service,
            gate: &self.gate,
            updater: self.updater.as_ref(),
            supervisor: &self.supervisor,
            snapshots,
            dependencies: self.dependencies.as_ref(),
            ledger: &self.ledger,
            health: &self.config.health,
            observer,
        }
    }
}

/// Prints phase changes as progress lines.
pub struct ProgressObserver<'a> {
    output: &'a Output,
}

impl<'a> ProgressObserver<'a> {
    pub fn new(output: &'a Output) -> Self {
        Self { output }
    }
}

impl ReleaseObserver for ProgressObserver<'_> {
    fn phase(&self, phase: ReleasePhase) {
        LogObserver.phase(phase);
        if !matches!(phase, ReleasePhase::Idle | ReleasePhase::Done) {
            self.output.progress(&format!("  → {phase}..."));
        }
    }
}
