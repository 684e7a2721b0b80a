// ABOUTME: Manual rollback to the most recent snapshot.
// ABOUTME: Restores the tree, resyncs dependencies if the manifest differs, restarts, and waits for health.

use chrono::Utc;

use crate::diagnostics::{Diagnostics, Warning};
use crate::lock::HostLock;
use crate::snapshot::{Snapshot, SnapshotError};

use super::context::ReleaseContext;
use super::dependencies::DependencySync;
use super::error::{ReleaseError, RollbackStep};
use super::ledger::{ReleaseOutcome, ReleaseRecord};
use super::phase::ReleasePhase;
use super::pipeline::{RELEASE_LOCK, record};

/// Manual rollback: put the latest snapshot back live.
///
/// This function:
/// 1. Takes the release lock
/// 2. Restores the most recent snapshot over the live tree
/// 3. Reruns the dependency command if the restored manifest differs from
///    the recorded one
/// 4. Restarts the service and waits for it to become healthy
/// 5. Records the restored revision as current; a failed write is a warning
///
/// Rolling back twice restores the same snapshot again.
///
/// # Errors
///
/// Returns `ReleaseError::NoSnapshot` when there is nothing to restore and
/// `ReleaseError::RollbackFailure` for any later failure.
pub async fn manual_rollback(
    cx: &ReleaseContext<'_>,
    force: bool,
    diag: &mut Diagnostics,
) -> Result<Snapshot, ReleaseError> {
    HostLock::with_lock(cx.ledger.dir(), RELEASE_LOCK, force, async {
        let started_at = Utc::now();
        cx.enter(ReleasePhase::RollingBack);
        let result = restore(cx, diag).await;
        cx.enter(ReleasePhase::Idle);

        if !matches!(result, Err(ReleaseError::NoSnapshot)) {
            let entry = match &result {
                Ok(snapshot) => ReleaseRecord {
                    revision: snapshot.revision.as_ref().map(|r| r.to_string()),
                    outcome: ReleaseOutcome::ManualRollback,
                    snapshot: Some(snapshot.name.clone()),
                    started_at,
                    finished_at: Utc::now(),
                    message: None,
                },
                Err(e) => ReleaseRecord {
                    revision: None,
                    outcome: ReleaseOutcome::RollbackFailed,
                    snapshot: None,
                    started_at,
                    finished_at: Utc::now(),
                    message: Some(e.to_string()),
                },
            };
            record(cx, diag, entry);
        }

        result
    })
    .await
}

async fn restore(cx: &ReleaseContext<'_>, diag: &mut Diagnostics) -> Result<Snapshot, ReleaseError> {
    let fail = |step: RollbackStep, message: String| ReleaseError::RollbackFailure {
        step,
        service: cx.service.to_string(),
        message,
        cause: None,
    };

    let restored = match cx.snapshots.restore_latest().await {
        Ok(snapshot) => snapshot,
        Err(SnapshotError::NoSnapshot) => return Err(ReleaseError::NoSnapshot),
        Err(e) => return Err(fail(RollbackStep::Restore, e.to_string())),
    };

    let mut digest = None;
    if let Some(deps) = cx.dependencies {
        digest = deps
            .manifest_digest(cx.app_dir())
            .map_err(|e| fail(RollbackStep::Dependencies, e.to_string()))?;
        let recorded = cx
            .ledger
            .dependency_digest()
            .map_err(|e| fail(RollbackStep::Dependencies, e.to_string()))?;
        if DependencySync::needs_sync(digest.as_deref(), recorded.as_deref()) {
            deps.install(cx.app_dir())
                .await
                .map_err(|e| fail(RollbackStep::Dependencies, e.to_string()))?;
        }
    }

    cx.supervisor
        .restart(cx.service)
        .await
        .map_err(|e| fail(RollbackStep::Restart, e.to_string()))?;

    if !cx.prober().wait_until_healthy(cx.health.timeout).await {
        return Err(fail(
            RollbackStep::HealthCheck,
            format!("{} not healthy within {:?}", cx.service, cx.health.timeout),
        ));
    }

    if let Err(e) = cx.ledger.set_current_revision(restored.revision.as_ref()) {
        diag.warn(Warning::ledger(format!(
            "restored {} but could not record it: {}",
            restored.name, e
        )));
    }
    if cx.dependencies.is_some()
        && let Err(e) = cx.ledger.set_dependency_digest(digest.as_deref())
    {
        diag.warn(Warning::ledger(format!(
            "could not record dependency digest: {}",
            e
        )));
    }

    tracing::info!("Rolled back to {}", restored.name);
    Ok(restored)
}
