// ABOUTME: Dependency resync driven by the digest of a manifest file.
// ABOUTME: The install command runs only when the manifest changed since the last good release.

use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::DependencyConfig;
use crate::exec::CommandSpec;

use super::updater::UpdateError;

#[derive(Debug, Clone)]
pub struct DependencySync {
    manifest: PathBuf,
    command: String,
    timeout: Duration,
}

impl DependencySync {
    pub fn new(config: &DependencyConfig) -> Self {
        Self {
            manifest: config.manifest.clone(),
            command: config.command.clone(),
            timeout: config.timeout,
        }
    }

    pub fn manifest(&self) -> &Path {
        &self.manifest
    }

    /// SHA-256 of the manifest inside `app_dir`, `None` when it is absent.
    pub fn manifest_digest(&self, app_dir: &Path) -> io::Result<Option<String>> {
        match std::fs::read(app_dir.join(&self.manifest)) {
            Ok(content) => Ok(Some(hex::encode(Sha256::digest(&content)))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Whether a tree with manifest `current` needs the install command,
    /// given the digest recorded by the last good release.
    pub fn needs_sync(current: Option<&str>, recorded: Option<&str>) -> bool {
        current.is_some() && current != recorded
    }

    /// Run the install command in `app_dir`.
    pub async fn install(&self, app_dir: &Path) -> Result<(), UpdateError> {
        let spec = CommandSpec::shell(&self.command)
            .current_dir(app_dir)
            .timeout(self.timeout);
        let output = spec.run().await?;
        if !output.success() {
            return Err(UpdateError::Command {
                command: self.command.clone(),
                message: output.summary(),
            });
        }
        tracing::info!("Dependencies synced with `{}`", self.command);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync(command: &str) -> DependencySync {
        DependencySync::new(&DependencyConfig {
            manifest: PathBuf::from("requirements.txt"),
            command: command.to_string(),
            timeout: Duration::from_secs(10),
        })
    }

    #[test]
    fn digest_tracks_manifest_content() {
        let dir = tempfile::tempdir().unwrap();
        let deps = sync("true");
        assert_eq!(deps.manifest_digest(dir.path()).unwrap(), None);

        std::fs::write(dir.path().join("requirements.txt"), "flask==3.0\n").unwrap();
        let first = deps.manifest_digest(dir.path()).unwrap().unwrap();
        assert_eq!(first.len(), 64);

        std::fs::write(dir.path().join("requirements.txt"), "flask==3.1\n").unwrap();
        let second = deps.manifest_digest(dir.path()).unwrap().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn sync_needed_only_when_manifest_changed() {
        assert!(DependencySync::needs_sync(Some("a"), None));
        assert!(DependencySync::needs_sync(Some("a"), Some("b")));
        assert!(!DependencySync::needs_sync(Some("a"), Some("a")));
        assert!(!DependencySync::needs_sync(None, Some("a")));
    }

    #[tokio::test]
    async fn failing_install_reports_command() {
        let dir = tempfile::tempdir().unwrap();
        let err = sync("echo broken >&2; exit 1")
            .install(dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("broken"));
    }
}
