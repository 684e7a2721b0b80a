// ABOUTME: State transition methods for release orchestration.
// ABOUTME: Each method consumes self and returns the next state on success.

use crate::diagnostics::{Diagnostics, Warning};

use super::Release;
use super::context::ReleaseContext;
use super::dependencies::DependencySync;
use super::error::{ReleaseError, RollbackStep};
use super::state::{
    Completed, GatePassed, Healthy, Initialized, Mutable, Restarted, RolledBack, Snapshotted,
    Updated,
};

/// Result type for transitions that may need rollback on failure.
pub type TransitionResult<T, S> = Result<Release<T>, (Release<S>, ReleaseError)>;

// =============================================================================
// Internal Helpers
// =============================================================================

impl<S> Release<S> {
    fn update_failure(&self, message: impl Into<String>) -> ReleaseError {
        ReleaseError::UpdateFailure {
            revision: self.revision.to_string(),
            message: message.into(),
        }
    }
}

// =============================================================================
// Initialized -> GatePassed
// =============================================================================

impl Release<Initialized> {
    /// Stage the candidate under `<state_dir>/staging` and run the test gate
    /// there. Nothing the live tree's digest covers is touched whatever the
    /// result.
    ///
    /// # Errors
    ///
    /// Returns `ReleaseError::GateFailure` if the candidate cannot be staged,
    /// or the gate exits non-zero, times out or cannot be started.
    #[must_use = "release state must be used"]
    pub async fn run_gate(
        self,
        cx: &ReleaseContext<'_>,
        diag: &mut Diagnostics,
    ) -> Result<Release<GatePassed>, ReleaseError> {
        let scratch = cx.staging_dir().map_err(|e| self.gate_failure(e.to_string()))?;
        let staged = scratch.path().join("tree");

        if let Err(e) = cx.updater.stage(cx.app_dir(), &self.revision, &staged).await {
            return Err(self.gate_failure(format!("staging {}: {}", self.revision, e)));
        }
        let result = cx.gate.run(&self.revision, &staged).await;
        if let Err(e) = cx.updater.unstage(cx.app_dir(), &staged).await {
            diag.warn(Warning::staging(format!(
                "could not remove staged tree {}: {}",
                staged.display(),
                e
            )));
        }
        drop(scratch);

        let message = match result {
            Ok(output) if output.success() => {
                tracing::info!("Test gate passed for {}", self.revision);
                return Ok(self.advance(|_| GatePassed));
            }
            Ok(output) => output.summary(),
            Err(e) => e.to_string(),
        };
        Err(self.gate_failure(message))
    }

    fn gate_failure(&self, message: impl Into<String>) -> ReleaseError {
        ReleaseError::GateFailure {
            revision: self.revision.to_string(),
            message: message.into(),
        }
    }
}

// =============================================================================
// GatePassed -> Snapshotted
// =============================================================================

impl Release<GatePassed> {
    /// Archive the live tree as it is before the update, labelled with the
    /// revision the ledger says is running, then apply retention. Eviction
    /// problems are warnings.
    ///
    /// # Errors
    ///
    /// Returns `ReleaseError::SnapshotFailure`; the live tree is untouched.
    #[must_use = "release state must be used"]
    pub async fn take_snapshot(
        mut self,
        cx: &ReleaseContext<'_>,
        diag: &mut Diagnostics,
    ) -> Result<Release<Snapshotted>, ReleaseError> {
        let handle = cx
            .snapshots
            .create(self.previous.as_ref())
            .await
            .map_err(ReleaseError::SnapshotFailure)?;

        match cx.snapshots.evict_oldest().await {
            Ok(evicted) => self.evicted = evicted,
            Err(e) => diag.warn(Warning::eviction(format!("snapshot eviction failed: {}", e))),
        }

        Ok(self.advance(|_| Snapshotted { handle }))
    }
}

// =============================================================================
// Snapshotted -> Updated
// =============================================================================

impl Release<Snapshotted> {
    /// Advance the live tree to the revision, then resync dependencies if the
    /// manifest changed since the last good release.
    ///
    /// # Errors
    ///
    /// Returns `(self, error)` on failure to allow rollback.
    #[must_use = "release state must be used"]
    pub async fn update(mut self, cx: &ReleaseContext<'_>) -> TransitionResult<Updated, Snapshotted> {
        if let Err(e) = cx.updater.update(cx.app_dir(), &self.revision).await {
            let err = self.update_failure(e.to_string());
            return Err((self, err));
        }

        if let Some(deps) = cx.dependencies
            && let Err(message) = self.sync_dependencies(cx, deps).await
        {
            let err = self.update_failure(message);
            return Err((self, err));
        }

        Ok(self.advance(|s| Updated { handle: s.handle }))
    }

    async fn sync_dependencies(
        &mut self,
        cx: &ReleaseContext<'_>,
        deps: &DependencySync,
    ) -> Result<(), String> {
        let digest = deps
            .manifest_digest(cx.app_dir())
            .map_err(|e| format!("reading {}: {}", deps.manifest().display(), e))?;
        let recorded = cx.ledger.dependency_digest().map_err(|e| e.to_string())?;
        self.dependencies.digest = digest.clone();

        if !DependencySync::needs_sync(digest.as_deref(), recorded.as_deref()) {
            tracing::debug!("{} unchanged, skipping dependency sync", deps.manifest().display());
            return Ok(());
        }

        // Set before running so a half-finished install is redone on rollback.
        self.dependencies.resynced = true;
        deps.install(cx.app_dir()).await.map_err(|e| e.to_string())
    }
}

// =============================================================================
// Updated -> Restarted
// =============================================================================

impl Release<Updated> {
    /// Restart the service on the updated tree.
    ///
    /// # Errors
    ///
    /// Returns `(self, error)` on failure to allow rollback.
    #[must_use = "release state must be used"]
    pub async fn restart(self, cx: &ReleaseContext<'_>) -> TransitionResult<Restarted, Updated> {
        match cx.supervisor.restart(cx.service).await {
            Ok(()) => Ok(self.advance(|s| Restarted { handle: s.handle })),
            Err(e) => {
                let err = ReleaseError::RestartFailure {
                    service: cx.service.to_string(),
                    message: e.to_string(),
                };
                Err((self, err))
            }
        }
    }
}

// =============================================================================
// Restarted -> Healthy
// =============================================================================

impl Release<Restarted> {
    /// Wait up to `health.timeout` for the supervisor to report the service active.
    ///
    /// # Errors
    ///
    /// Returns `(self, HealthCheckTimeout)` to allow rollback.
    #[must_use = "release state must be used"]
    pub async fn health_check(self, cx: &ReleaseContext<'_>) -> TransitionResult<Healthy, Restarted> {
        if cx.prober().wait_until_healthy(cx.health.timeout).await {
            return Ok(self.advance(|s| Healthy { handle: s.handle }));
        }
        let err = ReleaseError::HealthCheckTimeout {
            service: cx.service.to_string(),
            timeout: cx.health.timeout,
        };
        Err((self, err))
    }
}

// =============================================================================
// Healthy -> Completed
// =============================================================================

impl Release<Healthy> {
    /// Record the new revision and dependency digest. The service is already
    /// healthy on the new tree, so a ledger write that fails is a warning.
    pub fn complete(self, cx: &ReleaseContext<'_>, diag: &mut Diagnostics) -> Release<Completed> {
        if let Err(e) = cx.ledger.set_current_revision(Some(&self.revision)) {
            diag.warn(Warning::ledger(format!(
                "released {} but could not record it: {}",
                self.revision, e
            )));
        }
        if cx.dependencies.is_some()
            && let Err(e) = cx
                .ledger
                .set_dependency_digest(self.dependencies.digest.as_deref())
        {
            diag.warn(Warning::ledger(format!(
                "could not record dependency digest: {}",
                e
            )));
        }

        tracing::info!("Released {}", self.revision);
        self.advance(|s| Completed { handle: s.handle })
    }
}

// =============================================================================
// Rollback - any state after the snapshot
// =============================================================================

impl<S: Mutable> Release<S> {
    /// Put the pre-release tree back and bring the service up on it.
    ///
    /// Restores the latest snapshot, checks its digest against the one taken
    /// for this release, redoes the dependency sync if this release ran it,
    /// restarts and waits for health once. Never retried.
    ///
    /// # Errors
    ///
    /// Returns `ReleaseError::RollbackFailure` naming the step that failed.
    #[must_use = "release state must be used"]
    pub async fn rollback(
        self,
        cx: &ReleaseContext<'_>,
        cause: &ReleaseError,
    ) -> Result<Release<RolledBack>, ReleaseError> {
        let cause = cause.to_string();
        let fail = |step: RollbackStep, message: String| ReleaseError::RollbackFailure {
            step,
            service: cx.service.to_string(),
            message,
            cause: Some(cause.clone()),
        };

        let restored = cx
            .snapshots
            .restore_latest()
            .await
            .map_err(|e| fail(RollbackStep::Restore, e.to_string()))?;

        let digest = cx
            .snapshots
            .live_digest()
            .await
            .map_err(|e| fail(RollbackStep::Verify, e.to_string()))?;
        if digest != self.snapshot().digest {
            return Err(fail(
                RollbackStep::Verify,
                format!(
                    "restored {} does not match the snapshot taken for this release ({})",
                    restored.name,
                    self.snapshot().snapshot.name
                ),
            ));
        }

        if self.dependencies.resynced
            && let Some(deps) = cx.dependencies
        {
            deps.install(cx.app_dir())
                .await
                .map_err(|e| fail(RollbackStep::Dependencies, e.to_string()))?;
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

        tracing::info!("Rolled back to {}", restored.name);
        Ok(self.advance(|_| RolledBack { restored }))
    }
}
