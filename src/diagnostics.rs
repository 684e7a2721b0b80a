// ABOUTME: Diagnostics accumulator for non-fatal warnings during a run.
// ABOUTME: Collects problems that shouldn't fail a release but should be shown to operators.

/// Collects non-fatal warnings during release, rollback and firewall runs.
#[derive(Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A non-fatal warning collected during a run.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// Old snapshots could not be evicted after a new one was taken.
    pub fn eviction(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Eviction,
            message: message.into(),
        }
    }

    /// The release history could not be appended to.
    pub fn history(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::History,
            message: message.into(),
        }
    }

    /// The current revision or dependency digest could not be recorded.
    pub fn ledger(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Ledger,
            message: message.into(),
        }
    }

    /// A staged gate tree could not be removed.
    pub fn staging(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Staging,
            message: message.into(),
        }
    }

    /// The firewall was changed although the session address is not allow-listed.
    pub fn lockout_override(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::LockoutOverride,
            message: message.into(),
        }
    }
}

/// Categories of warnings that can occur during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Snapshot retention could not be enforced; the backup dir may grow.
    Eviction,
    /// A finished release is missing from `history.jsonl`.
    History,
    /// The next release will see a stale current revision.
    Ledger,
    /// Leftovers under `<state_dir>/staging` or a stale git worktree entry.
    Staging,
    /// Operator confirmed a rule change that may cut off their session.
    LockoutOverride,
}
