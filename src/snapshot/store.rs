// ABOUTME: Snapshot store: create, list, restore and evict point-in-time archives.
// ABOUTME: Ordering always comes from the timestamp parsed out of the archive name.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::archive::ArchiveStore;
use super::tree;
use super::SnapshotError;
use crate::types::Revision;

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.6fZ";
const UNTRACKED: &str = "untracked";

/// A complete archive of a previously deployed tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub name: String,
    /// Revision that was live when the snapshot was taken.
    pub revision: Option<Revision>,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    /// `<revision|untracked>_<timestamp>`. `_` never occurs in a revision tag.
    pub fn name_for(revision: Option<&Revision>, created_at: DateTime<Utc>) -> String {
        let label = revision.map(Revision::as_tag).unwrap_or(UNTRACKED);
        format!("{}_{}", label, created_at.format(TIMESTAMP_FORMAT))
    }

    /// Parse an archive name back into a snapshot. Foreign files yield `None`.
    pub fn parse_name(name: &str) -> Option<Self> {
        let (label, stamp) = name.rsplit_once('_')?;
        let created_at = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
            .ok()?
            .and_utc();
        let revision = if label == UNTRACKED {
            None
        } else {
            Some(Revision::parse(label).ok()?)
        };
        Some(Self {
            name: name.to_string(),
            revision,
            created_at,
        })
    }

    pub fn revision_label(&self) -> &str {
        self.revision
            .as_ref()
            .map(Revision::as_tag)
            .unwrap_or(UNTRACKED)
    }
}

/// A freshly created snapshot plus the digest of the tree it captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHandle {
    pub snapshot: Snapshot,
    pub digest: String,
}

/// Newest first: creation time descending, ties by name descending.
pub fn sort_newest_first(snapshots: &mut [Snapshot]) {
    snapshots.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.name.cmp(&a.name))
    });
}

/// Snapshots to delete so that only the `retain` most recent remain.
/// The most recent snapshot is never selected while `retain >= 1`.
pub fn select_evictions(mut snapshots: Vec<Snapshot>, retain: usize) -> Vec<Snapshot> {
    sort_newest_first(&mut snapshots);
    if snapshots.len() <= retain {
        return Vec::new();
    }
    snapshots.split_off(retain)
}

pub struct SnapshotStore<'a> {
    archive: &'a dyn ArchiveStore,
    live_dir: PathBuf,
    retain: usize,
}

impl<'a> SnapshotStore<'a> {
    pub fn new(archive: &'a dyn ArchiveStore, live_dir: impl Into<PathBuf>, retain: usize) -> Self {
        Self {
            archive,
            live_dir: live_dir.into(),
            retain: retain.max(1),
        }
    }

    pub fn live_dir(&self) -> &Path {
        &self.live_dir
    }

    pub fn retain(&self) -> usize {
        self.retain
    }

    /// Archive the current live tree, labelled with the revision it holds.
    pub async fn create(&self, revision: Option<&Revision>) -> Result<SnapshotHandle, SnapshotError> {
        self.create_at(revision, Utc::now()).await
    }

    /// [`Self::create`] at a fixed timestamp (used for deterministic tests).
    pub async fn create_at(
        &self,
        revision: Option<&Revision>,
        created_at: DateTime<Utc>,
    ) -> Result<SnapshotHandle, SnapshotError> {
        let name = Snapshot::name_for(revision, created_at);
        let digest = self.live_digest().await?;

        self.archive.write(&name, &self.live_dir).await?;
        tracing::info!("Created snapshot {} ({})", name, &digest[..12]);

        Ok(SnapshotHandle {
            snapshot: Snapshot {
                name,
                revision: revision.cloned(),
                created_at,
            },
            digest,
        })
    }

    /// Content digest of the live tree as it is right now.
    pub async fn live_digest(&self) -> Result<String, SnapshotError> {
        let live = self.live_dir.clone();
        tokio::task::spawn_blocking(move || {
            tree::tree_digest(&live).map_err(|source| SnapshotError::LiveTree { path: live, source })
        })
        .await
        .map_err(|e| SnapshotError::Task(e.to_string()))?
    }

    /// All recognised snapshots, newest first.
    pub async fn list(&self) -> Result<Vec<Snapshot>, SnapshotError> {
        let mut snapshots = Vec::new();
        for name in self.archive.list().await? {
            match Snapshot::parse_name(&name) {
                Some(snapshot) => snapshots.push(snapshot),
                None => tracing::debug!("Ignoring unrecognised archive {}", name),
            }
        }
        sort_newest_first(&mut snapshots);
        Ok(snapshots)
    }

    pub async fn latest(&self) -> Result<Option<Snapshot>, SnapshotError> {
        Ok(self.list().await?.into_iter().next())
    }

    /// Overwrite the live tree with the most recent snapshot.
    ///
    /// The archive is unpacked beside the live tree and swapped in, so this
    /// works whether the live tree is intact, half-updated or missing.
    pub async fn restore_latest(&self) -> Result<Snapshot, SnapshotError> {
        let latest = self.latest().await?.ok_or(SnapshotError::NoSnapshot)?;
        let staging = tree::sibling(&self.live_dir, "restore");

        let cleanup = staging.clone();
        tokio::task::spawn_blocking(move || {
            if cleanup.exists() {
                std::fs::remove_dir_all(&cleanup).map_err(|source| SnapshotError::LiveTree {
                    path: cleanup.clone(),
                    source,
                })?;
            }
            Ok::<_, SnapshotError>(())
        })
        .await
        .map_err(|e| SnapshotError::Task(e.to_string()))??;

        self.archive.extract(&latest.name, &staging).await?;

        let live = self.live_dir.clone();
        tokio::task::spawn_blocking(move || {
            tree::replace_dir(&staging, &live)
                .map_err(|source| SnapshotError::LiveTree { path: live, source })
        })
        .await
        .map_err(|e| SnapshotError::Task(e.to_string()))??;

        tracing::info!("Restored snapshot {}", latest.name);
        Ok(latest)
    }

    /// Delete all but the configured number of most recent snapshots.
    pub async fn evict_oldest(&self) -> Result<Vec<Snapshot>, SnapshotError> {
        let evicted = select_evictions(self.list().await?, self.retain);
        for snapshot in &evicted {
            self.archive.remove(&snapshot.name).await?;
            tracing::info!("Evicted snapshot {}", snapshot.name);
        }
        Ok(evicted)
    }
}
