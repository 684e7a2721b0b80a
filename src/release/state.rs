// ABOUTME: Release state marker types for the type state pattern.
// ABOUTME: States after the snapshot carry its handle, so only they can roll back.

use crate::snapshot::{Snapshot, SnapshotHandle};

/// Revision chosen, nothing run yet.
/// Available actions: `run_gate()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Initialized;

/// Test gate passed; host still untouched.
/// Available actions: `take_snapshot()`
#[derive(Debug, Clone, Copy, Default)]
pub struct GatePassed;

/// Pre-update tree archived and retention applied.
/// Available actions: `update()`, `rollback()`
#[derive(Debug, Clone)]
pub struct Snapshotted {
    pub(crate) handle: SnapshotHandle,
}

/// Live tree advanced to the new revision.
/// Available actions: `restart()`, `rollback()`
#[derive(Debug, Clone)]
pub struct Updated {
    pub(crate) handle: SnapshotHandle,
}

/// Service restarted on the new tree.
/// Available actions: `health_check()`, `rollback()`
#[derive(Debug, Clone)]
pub struct Restarted {
    pub(crate) handle: SnapshotHandle,
}

/// Service reported healthy.
/// Available actions: `complete()`
#[derive(Debug, Clone)]
pub struct Healthy {
    pub(crate) handle: SnapshotHandle,
}

/// New revision recorded as current.
#[derive(Debug, Clone)]
pub struct Completed {
    pub(crate) handle: SnapshotHandle,
}

/// Snapshot restored after a failure and the service healthy again.
#[derive(Debug, Clone)]
pub struct RolledBack {
    pub(crate) restored: Snapshot,
}

/// States that hold the pre-release snapshot.
pub trait HasSnapshot {
    fn handle(&self) -> &SnapshotHandle;
}

/// States in which the live tree may differ from the snapshot, and so the
/// only states a release can roll back from.
pub trait Mutable: HasSnapshot {}

macro_rules! has_snapshot {
    ($($state:ty),*) => {
        $(impl HasSnapshot for $state {
            fn handle(&self) -> &SnapshotHandle {
                &self.handle
            }
        })*
    };
}

has_snapshot!(Snapshotted, Updated, Restarted, Healthy, Completed);

impl Mutable for Snapshotted {}
impl Mutable for Updated {}
impl Mutable for Restarted {}
