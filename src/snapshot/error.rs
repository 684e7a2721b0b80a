// ABOUTME: Error types for snapshot operations.
// ABOUTME: Covers archive writes, extraction, eviction, and live-tree replacement.

use std::path::PathBuf;

/// Errors from the snapshot store and its archive backend.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Archive could not be completed; nothing was left behind.
    #[error("failed to write snapshot {name}: {source}")]
    Write {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to extract snapshot {name}: {source}")]
    Extract {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove snapshot {name}: {source}")]
    Remove {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to list snapshots in {dir}: {source}")]
    List {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("live tree {path}: {source}")]
    LiveTree {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Nothing to restore from.
    #[error("no snapshot available to restore")]
    NoSnapshot,

    #[error("background task failed: {0}")]
    Task(String),
}
