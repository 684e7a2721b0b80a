// ABOUTME: Generic release struct parameterized by state marker.
// ABOUTME: Data shared by every phase lives here; phase data lives in the state type.

use chrono::{DateTime, Utc};

use crate::snapshot::{Snapshot, SnapshotHandle};
use crate::types::Revision;

use super::state::{HasSnapshot, Initialized, RolledBack};

/// Dependency bookkeeping gathered while updating the tree.
#[derive(Debug, Clone, Default)]
pub struct DependencyState {
    /// Manifest digest of the updated tree, `None` without a manifest.
    pub digest: Option<String>,
    /// Whether this release ran the dependency command (even if it failed).
    pub resynced: bool,
}

/// A release in progress, parameterized by its current state.
#[derive(Debug)]
pub struct Release<S> {
    pub(crate) revision: Revision,
    pub(crate) previous: Option<Revision>,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) dependencies: DependencyState,
    /// Snapshots deleted by retention once this release's snapshot existed.
    pub(crate) evicted: Vec<Snapshot>,
    pub(crate) state: S,
}

impl Release<Initialized> {
    /// Start releasing `revision` over a host currently running `previous`.
    pub fn new(revision: Revision, previous: Option<Revision>) -> Self {
        Release {
            revision,
            previous,
            started_at: Utc::now(),
            dependencies: DependencyState::default(),
            evicted: Vec::new(),
            state: Initialized,
        }
    }
}

impl<S> Release<S> {
    pub fn revision(&self) -> &Revision {
        &self.revision
    }

    /// Revision recorded as live when the release started.
    pub fn previous(&self) -> Option<&Revision> {
        self.previous.as_ref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn dependencies(&self) -> &DependencyState {
        &self.dependencies
    }

    pub fn evicted(&self) -> &[Snapshot] {
        &self.evicted
    }

    /// Move to the next state, building it from the current one.
    pub(crate) fn advance<T>(self, next: impl FnOnce(S) -> T) -> Release<T> {
        Release {
            revision: self.revision,
            previous: self.previous,
            started_at: self.started_at,
            dependencies: self.dependencies,
            evicted: self.evicted,
            state: next(self.state),
        }
    }
}

impl<S: HasSnapshot> Release<S> {
    /// Snapshot taken before this release touched the live tree.
    pub fn snapshot(&self) -> &SnapshotHandle {
        self.state.handle()
    }
}

impl Release<RolledBack> {
    pub fn restored(&self) -> &Snapshot {
        &self.state.restored
    }
}
