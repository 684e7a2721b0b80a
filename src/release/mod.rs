// ABOUTME: Release orchestration using the type state pattern.
// ABOUTME: Exports the state machine, its capabilities, the ledger, and the release/rollback drivers.

mod context;
mod dependencies;
mod error;
mod gate;
mod ledger;
mod machine;
mod phase;
mod pipeline;
mod rollback;
mod state;
mod transitions;
mod updater;

pub use context::ReleaseContext;
pub use dependencies::DependencySync;
pub use error::{ReleaseError, ReleaseErrorKind, RollbackStep};
pub use gate::{APP_DIR_ENV, CommandGate, REVISION_ENV, TestGate};
pub use ledger::{ReleaseLedger, ReleaseOutcome, ReleaseRecord};
pub use machine::{DependencyState, Release};
pub use phase::{LogObserver, ReleaseObserver, ReleasePhase};
pub use pipeline::{RELEASE_LOCK, ReleaseSummary, run_release};
pub use rollback::manual_rollback;
pub use state::{
    Completed, GatePassed, HasSnapshot, Healthy, Initialized, Mutable, Restarted, RolledBack,
    Snapshotted, Updated,
};
pub use transitions::TransitionResult;
pub use updater::{DirectoryUpdater, GitUpdater, TreeUpdater, UpdateError, updater_for};
