// ABOUTME: Everything a release needs from the host, bundled for the transitions.
// ABOUTME: Capabilities are trait objects so tests can swap in fakes.

use std::io;
use std::path::Path;

use crate::config::HealthcheckConfig;
use crate::health::HealthProber;
use crate::snapshot::SnapshotStore;
use crate::supervisor::ProcessSupervisor;
use crate::types::ServiceName;

use super::dependencies::DependencySync;
use super::gate::TestGate;
use super::ledger::ReleaseLedger;
use super::phase::{ReleaseObserver, ReleasePhase};
use super::updater::TreeUpdater;

pub struct ReleaseContext<'a> {
    pub service: &'a ServiceName,
    pub gate: &'a dyn TestGate,
    pub updater: &'a dyn TreeUpdater,
    pub supervisor: &'a dyn ProcessSupervisor,
    pub snapshots: &'a SnapshotStore<'a>,
    pub dependencies: Option<&'a DependencySync>,
    pub ledger: &'a ReleaseLedger,
    pub health: &'a HealthcheckConfig,
    pub observer: &'a dyn ReleaseObserver,
}

impl<'a> ReleaseContext<'a> {
    /// The live tree the snapshot store protects.
    pub fn app_dir(&self) -> &Path {
        self.snapshots.live_dir()
    }

    /// Fresh scratch directory under `<state_dir>/staging`, removed on drop.
    pub fn staging_dir(&self) -> io::Result<tempfile::TempDir> {
        let parent = self.ledger.dir().join("staging");
        std::fs::create_dir_all(&parent)?;
        tempfile::Builder::new().prefix("gate-").tempdir_in(parent)
    }

    pub fn prober(&self) -> HealthProber<'a> {
        HealthProber::new(self.supervisor, self.service, self.health)
    }

    pub(crate) fn enter(&self, phase: ReleasePhase) {
        self.observer.phase(phase);
    }
}
