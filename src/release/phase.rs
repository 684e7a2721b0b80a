// ABOUTME: Release phases as reported to observers while a release runs.
// ABOUTME: The CLI prints them; tests record them to check the sequence.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleasePhase {
    Idle,
    TestsRunning,
    Snapshotting,
    Updating,
    Restarting,
    HealthChecking,
    Done,
    RollingBack,
}

impl fmt::Display for ReleasePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReleasePhase::Idle => "idle",
            ReleasePhase::TestsRunning => "running test gate",
            ReleasePhase::Snapshotting => "snapshotting live tree",
            ReleasePhase::Updating => "updating live tree",
            ReleasePhase::Restarting => "restarting service",
            ReleasePhase::HealthChecking => "waiting for health",
            ReleasePhase::Done => "done",
            ReleasePhase::RollingBack => "rolling back",
        };
        f.write_str(s)
    }
}

/// Notified on every phase change.
pub trait ReleaseObserver: Send + Sync {
    fn phase(&self, phase: ReleasePhase);
}

/// Observer that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ReleaseObserver for LogObserver {
    fn phase(&self, phase: ReleasePhase) {
        tracing::info!("Release phase: {}", phase);
    }
}
