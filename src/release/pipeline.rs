// ABOUTME: Runs a complete release through the state machine under the release lock.
// ABOUTME: Failures after the snapshot trigger exactly one rollback; every outcome is logged to history.

use chrono::Utc;
use serde::Serialize;

use crate::diagnostics::{Diagnostics, Warning};
use crate::lock::HostLock;
use crate::types::Revision;

use super::Release;
use super::context::ReleaseContext;
use super::error::ReleaseError;
use super::ledger::{ReleaseOutcome, ReleaseRecord};
use super::phase::ReleasePhase;
use super::state::{Completed, Initialized, Mutable};

/// Lock scope shared by releases and manual rollbacks.
pub const RELEASE_LOCK: &str = "release";

/// What a successful release did.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseSummary {
    pub revision: Revision,
    pub previous: Option<Revision>,
    pub snapshot: String,
    pub evicted: Vec<String>,
    pub dependencies_synced: bool,
}

impl ReleaseSummary {
    fn from_completed(release: &Release<Completed>) -> Self {
        Self {
            revision: release.revision().clone(),
            previous: release.previous().cloned(),
            snapshot: release.snapshot().snapshot.name.clone(),
            evicted: release.evicted().iter().map(|s| s.name.clone()).collect(),
            dependencies_synced: release.dependencies().resynced,
        }
    }
}

/// Release `revision`: gate, snapshot, update, restart, health check, and
/// rollback on failure. Holds `<state_dir>/release.lock` throughout.
///
/// # Errors
///
/// Returns the terminal failure. After a successful rollback this is
/// `ReleaseError::RolledBack` wrapping the original cause.
pub async fn run_release(
    cx: &ReleaseContext<'_>,
    revision: Revision,
    force: bool,
    diag: &mut Diagnostics,
) -> Result<ReleaseSummary, ReleaseError> {
    HostLock::with_lock(cx.ledger.dir(), RELEASE_LOCK, force, async {
        let previous = cx.ledger.current_revision()?;
        tracing::info!(
            "Releasing {} over {}",
            revision,
            previous
                .as_ref()
                .map(Revision::as_tag)
                .unwrap_or("untracked")
        );

        let release = Release::new(revision.clone(), previous);
        let started_at = release.started_at();
        let result = drive(cx, release, diag).await;
        cx.enter(ReleasePhase::Idle);

        let (outcome, snapshot, message) = match &result {
            Ok(release) => (
                ReleaseOutcome::Released,
                Some(release.snapshot().snapshot.name.clone()),
                None,
            ),
            Err(e) => (
                ReleaseOutcome::for_error(e),
                match e {
                    ReleaseError::RolledBack { snapshot, .. } => Some(snapshot.clone()),
                    _ => None,
                },
                Some(e.to_string()),
            ),
        };
        record(
            cx,
            diag,
            ReleaseRecord {
                revision: Some(revision.to_string()),
                outcome,
                snapshot,
                started_at,
                finished_at: Utc::now(),
                message,
            },
        );

        result.map(|release| ReleaseSummary::from_completed(&release))
    })
    .await
}

async fn drive(
    cx: &ReleaseContext<'_>,
    release: Release<Initialized>,
    diag: &mut Diagnostics,
) -> Result<Release<Completed>, ReleaseError> {
    cx.enter(ReleasePhase::TestsRunning);
    let release = release.run_gate(cx, diag).await?;

    cx.enter(ReleasePhase::Snapshotting);
    let release = release.take_snapshot(cx, diag).await?;

    cx.enter(ReleasePhase::Updating);
    let release = match release.update(cx).await {
        Ok(release) => release,
        Err((failed, e)) => return Err(roll_back(cx, failed, e).await),
    };

    cx.enter(ReleasePhase::Restarting);
    let release = match release.restart(cx).await {
        Ok(release) => release,
        Err((failed, e)) => return Err(roll_back(cx, failed, e).await),
    };

    cx.enter(ReleasePhase::HealthChecking);
    let release = match release.health_check(cx).await {
        Ok(release) => release,
        Err((failed, e)) => return Err(roll_back(cx, failed, e).await),
    };

    let release = release.complete(cx, diag);
    cx.enter(ReleasePhase::Done);
    Ok(release)
}

async fn roll_back<S: Mutable>(
    cx: &ReleaseContext<'_>,
    release: Release<S>,
    cause: ReleaseError,
) -> ReleaseError {
    tracing::warn!("Release of {} failed: {}", release.revision(), cause);
    cx.enter(ReleasePhase::RollingBack);
    match release.rollback(cx, &cause).await {
        Ok(rolled_back) => ReleaseError::RolledBack {
            snapshot: rolled_back.restored().name.clone(),
            cause: Box::new(cause),
        },
        Err(e) => e,
    }
}

/// Append to history; a failure here never changes the outcome.
pub(crate) fn record(cx: &ReleaseContext<'_>, diag: &mut Diagnostics, record: ReleaseRecord) {
    if let Err(e) = cx.ledger.append(&record) {
        diag.warn(Warning::history(format!("could not record release: {}", e)));
    }
}
