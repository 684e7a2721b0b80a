// ABOUTME: Tree updater capability that stages a revision for the gate and advances the live tree.
// ABOUTME: Git worktree and checkout of the tag, or copies of a per-tag release directory.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::SourceConfig;
use crate::exec::{CommandSpec, ExecError};
use crate::snapshot::tree;
use crate::types::Revision;

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("`{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("release directory {0} does not exist")]
    MissingRelease(PathBuf),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("background task failed: {0}")]
    Task(String),
}

/// Moves the live tree to a new revision. Callers snapshot first; an updater
/// may leave the tree half-written on error.
#[async_trait]
pub trait TreeUpdater: Send + Sync {
    /// Materialize `revision` at `into`, which must not exist yet, without
    /// changing any file the live tree's digest covers.
    async fn stage(
        &self,
        live: &Path,
        revision: &Revision,
        into: &Path,
    ) -> Result<(), UpdateError>;

    /// Drop a tree made by [`TreeUpdater::stage`].
    async fn unstage(&self, live: &Path, staged: &Path) -> Result<(), UpdateError>;

    async fn update(&self, live: &Path, revision: &Revision) -> Result<(), UpdateError>;
}

/// Build the updater the config asks for.
pub fn updater_for(source: &SourceConfig) -> Box<dyn TreeUpdater> {
    match source {
        SourceConfig::Git { remote } => Box::new(GitUpdater::new(remote.clone())),
        SourceConfig::Directory { path, preserve } => {
            Box::new(DirectoryUpdater::new(path.clone(), preserve.clone()))
        }
    }
}

/// `git fetch --tags` then a forced detached checkout of the tag. Staging
/// uses a detached worktree so the gate never runs in the live checkout.
#[derive(Debug, Clone)]
pub struct GitUpdater {
    remote: String,
    timeout: Duration,
}

impl GitUpdater {
    pub fn new(remote: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            timeout: Duration::from_secs(300),
        }
    }

    async fn git(&self, live: &Path, args: &[&str]) -> Result<(), UpdateError> {
        let spec = CommandSpec::new("git")
            .arg("-C")
            .arg(live.to_string_lossy())
            .args(args.iter().copied())
            .timeout(self.timeout);
        let output = spec.run().await?;
        if !output.success() {
            return Err(UpdateError::Command {
                command: spec.display(),
                message: output.summary(),
            });
        }
        Ok(())
    }

    async fn fetch(&self, live: &Path) -> Result<(), UpdateError> {
        self.git(live, &["fetch", "--force", "--tags", self.remote.as_str()])
            .await
    }
}

#[async_trait]
impl TreeUpdater for GitUpdater {
    async fn stage(
        &self,
        live: &Path,
        revision: &Revision,
        into: &Path,
    ) -> Result<(), UpdateError> {
        let tag_ref = format!("refs/tags/{}", revision.as_tag());
        let into = into.to_string_lossy().into_owned();
        self.fetch(live).await?;
        self.git(
            live,
            &["worktree", "add", "--detach", into.as_str(), tag_ref.as_str()],
        )
        .await?;
        tracing::debug!("Staged {} as worktree {}", revision, into);
        Ok(())
    }

    async fn unstage(&self, live: &Path, staged: &Path) -> Result<(), UpdateError> {
        let staged = staged.to_string_lossy().into_owned();
        self.git(live, &["worktree", "remove", "--force", staged.as_str()])
            .await
    }

    async fn update(&self, live: &Path, revision: &Revision) -> Result<(), UpdateError> {
        let tag_ref = format!("refs/tags/{}", revision.as_tag());
        self.fetch(live).await?;
        self.git(live, &["checkout", "--force", "--detach", tag_ref.as_str()])
            .await?;
        tracing::info!("Checked out {} in {}", revision, live.display());
        Ok(())
    }
}

/// Replace the live tree with `<releases>/<tag>`, keeping `preserve` entries.
#[derive(Debug, Clone)]
pub struct DirectoryUpdater {
    releases: PathBuf,
    preserve: Vec<String>,
}

impl DirectoryUpdater {
    pub fn new(releases: impl Into<PathBuf>, preserve: Vec<String>) -> Self {
        Self {
            releases: releases.into(),
            preserve,
        }
    }

    pub fn release_dir(&self, revision: &Revision) -> PathBuf {
        self.releases.join(revision.as_tag())
    }

    fn existing_release_dir(&self, revision: &Revision) -> Result<PathBuf, UpdateError> {
        let source = self.release_dir(revision);
        if !source.is_dir() {
            return Err(UpdateError::MissingRelease(source));
        }
        Ok(source)
    }
}

#[async_trait]
impl TreeUpdater for DirectoryUpdater {
    async fn stage(
        &self,
        _live: &Path,
        revision: &Revision,
        into: &Path,
    ) -> Result<(), UpdateError> {
        let source = self.existing_release_dir(revision)?;
        let into = into.to_path_buf();
        tokio::task::spawn_blocking(move || {
            tree::copy_tree(&source, &into).map_err(|source| UpdateError::Io { path: into, source })
        })
        .await
        .map_err(|e| UpdateError::Task(e.to_string()))?
    }

    async fn unstage(&self, _live: &Path, staged: &Path) -> Result<(), UpdateError> {
        let staged = staged.to_path_buf();
        tokio::task::spawn_blocking(move || match std::fs::remove_dir_all(&staged) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(UpdateError::Io { path: staged, source }),
        })
        .await
        .map_err(|e| UpdateError::Task(e.to_string()))?
    }

    async fn update(&self, live: &Path, revision: &Revision) -> Result<(), UpdateError> {
        let source = self.existing_release_dir(revision)?;

        let live = live.to_path_buf();
        let preserve = self.preserve.clone();
        let from = source.clone();
        tokio::task::spawn_blocking(move || {
            let io_err = |source| UpdateError::Io {
                path: live.clone(),
                source,
            };
            std::fs::create_dir_all(&live).map_err(io_err)?;
            tree::clear_dir_except(&live, &preserve).map_err(io_err)?;
            tree::copy_tree_except(&from, &live, &preserve).map_err(io_err)
        })
        .await
        .map_err(|e| UpdateError::Task(e.to_string()))??;

        tracing::info!("Replaced live tree from {}", source.display());
        Ok(())
    }
}
