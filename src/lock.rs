// ABOUTME: Host lock giving one process exclusive use of a deploy target or rule table.
// ABOUTME: Lock files appear fully written via a hard link; stale locks are broken with a warning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// How long an unreadable lock file is treated as held before it may be broken.
const UNREADABLE_GRACE: Duration = Duration::from_secs(60);

/// Errors acquiring or releasing a host lock.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("{scope} lock held by {holder} (pid {pid}) since {started_at}")]
    Held {
        scope: String,
        holder: String,
        pid: u32,
        started_at: DateTime<Utc>,
        path: PathBuf,
    },

    #[error("lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LockError {
    pub fn recovery_hint(&self) -> String {
        match self {
            LockError::Held { path, .. } => format!(
                "wait for the other run to finish, or pass --force if it is gone (lock: {})",
                path.display()
            ),
            LockError::Io { path, .. } => {
                format!("check permissions on {}", path.display())
            }
        }
    }
}

/// Information about who holds a lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// When the lock was acquired.
    pub started_at: DateTime<Utc>,
    /// What the lock protects, e.g. `release` or `firewall`.
    pub scope: String,
}

impl LockInfo {
    /// Create new lock info for the current process.
    pub fn new(scope: &str) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            scope: scope.to_string(),
        }
    }

    /// Check if this lock is stale (older than 1 hour).
    pub fn is_stale(&self) -> bool {
        let age = Utc::now() - self.started_at;
        age.num_hours() >= 1
    }

    /// Path to the lock file for a scope.
    pub fn lock_path(dir: &Path, scope: &str) -> PathBuf {
        dir.join(format!("{}.lock", scope))
    }
}

/// A held lock. Released explicitly with [`HostLock::release`], or on drop.
#[derive(Debug)]
pub struct HostLock {
    path: PathBuf,
    released: bool,
}

impl HostLock {
    /// Acquire the lock for `scope` inside `dir`.
    ///
    /// The lock file is written under a temporary name and hard-linked into
    /// place, so it never exists without its holder info and two processes
    /// can never both succeed. Stale locks (>1 hour) and lock files that
    /// have been unreadable for a minute are broken with a warning; `force`
    /// breaks an active lock.
    pub fn acquire(dir: &Path, scope: &str, force: bool) -> Result<Self, LockError> {
        std::fs::create_dir_all(dir).map_err(|source| LockError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = LockInfo::lock_path(dir, scope);
        let info = LockInfo::new(scope);

        if Self::try_create(&path, &info)? {
            return Ok(Self::held(path));
        }

        match Self::read_existing(&path) {
            Some(existing) if !force && !existing.is_stale() => {
                return Err(LockError::Held {
                    scope: scope.to_string(),
                    holder: existing.holder,
                    pid: existing.pid,
                    started_at: existing.started_at,
                    path,
                });
            }
            Some(existing) if force => {
                tracing::warn!(
                    "Breaking {} lock held by {} (pid {}) since {}",
                    scope,
                    existing.holder,
                    existing.pid,
                    existing.started_at
                );
            }
            Some(existing) => {
                tracing::warn!(
                    "Auto-breaking stale {} lock held by {} (pid {}) since {}",
                    scope,
                    existing.holder,
                    existing.pid,
                    existing.started_at
                );
            }
            None => {
                if !force && let Some(modified) = Self::written_recently(&path) {
                    return Err(LockError::Held {
                        scope: scope.to_string(),
                        holder: "unknown".to_string(),
                        pid: 0,
                        started_at: modified,
                        path,
                    });
                }
                tracing::warn!("Lock info at {} unreadable, breaking lock", path.display());
            }
        }

        let _ = std::fs::remove_file(&path);

        if Self::try_create(&path, &info)? {
            Ok(Self::held(path))
        } else {
            let existing = Self::read_existing(&path);
            Err(LockError::Held {
                scope: scope.to_string(),
                holder: existing
                    .as_ref()
                    .map(|e| e.holder.clone())
                    .unwrap_or_else(|| "unknown".to_string()),
                pid: existing.as_ref().map(|e| e.pid).unwrap_or(0),
                started_at: existing.map(|e| e.started_at).unwrap_or_else(Utc::now),
                path,
            })
        }
    }

    /// Run `f` while holding the lock, releasing it whatever the outcome.
    pub async fn with_lock<T, E, F>(dir: &Path, scope: &str, force: bool, f: F) -> Result<T, E>
    where
        F: std::future::Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let lock = Self::acquire(dir, scope, force)?;
        let result = f.await;
        if let Err(e) = lock.release() {
            tracing::warn!("Failed to release {} lock: {}", scope, e);
        }
        result
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock.
    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LockError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn held(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    /// Returns false when the file already exists.
    fn try_create(path: &Path, info: &LockInfo) -> Result<bool, LockError> {
        let io_err = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };
        let dir = path.parent().unwrap_or_else(|| Path::new("."));

        let mut tmp = tempfile::Builder::new()
            .prefix(".lock-")
            .tempfile_in(dir)
            .map_err(io_err)?;
        let json = serde_json::to_string(info)
            .map_err(|e| io_err(std::io::Error::other(e)))?;
        tmp.write_all(json.as_bytes()).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;

        match std::fs::hard_link(tmp.path(), path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(io_err(e)),
        }
    }

    /// Modification time of `path` if it is within the unreadable grace period.
    fn written_recently(path: &Path) -> Option<DateTime<Utc>> {
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
        let age = modified.elapsed().unwrap_or_default();
        (age < UNREADABLE_GRACE).then(|| DateTime::<Utc>::from(modified))
    }

    fn read_existing(path: &Path) -> Option<LockInfo> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }
}

impl Drop for HostLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_info_creates_with_current_host_and_pid() {
        let info = LockInfo::new("release");

        assert_eq!(info.scope, "release");
        assert_eq!(info.pid, std::process::id());
        assert!(!info.holder.is_empty());
    }

    #[test]
    fn lock_path_uses_scope() {
        assert_eq!(
            LockInfo::lock_path(Path::new("/var/lib/safeship"), "firewall"),
            PathBuf::from("/var/lib/safeship/firewall.lock")
        );
    }

    #[test]
    fn fresh_lock_is_not_stale() {
        assert!(!LockInfo::new("release").is_stale());
    }

    #[test]
    fn old_lock_is_stale() {
        let mut info = LockInfo::new("release");
        info.started_at = Utc::now() - chrono::Duration::hours(2);
        assert!(info.is_stale());
    }

    #[test]
    fn second_acquire_fails_with_holder_info() {
        let dir = tempfile::tempdir().unwrap();
        let lock = HostLock::acquire(dir.path(), "release", false).unwrap();

        let err = HostLock::acquire(dir.path(), "release", false).unwrap_err();
        match err {
            LockError::Held { pid, holder, .. } => {
                assert_eq!(pid, std::process::id());
                assert!(!holder.is_empty());
            }
            other => panic!("expected Held, got {other:?}"),
        }

        lock.release().unwrap();
        let again = HostLock::acquire(dir.path(), "release", false).unwrap();
        again.release().unwrap();
    }

    #[test]
    fn scopes_do_not_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let _release = HostLock::acquire(dir.path(), "release", false).unwrap();
        let _firewall = HostLock::acquire(dir.path(), "firewall", false).unwrap();
    }

    #[test]
    fn force_breaks_active_lock() {
        let dir = tempfile::tempdir().unwrap();
        let _held = HostLock::acquire(dir.path(), "release", false).unwrap();
        let forced = HostLock::acquire(dir.path(), "release", true).unwrap();
        assert!(forced.path().exists());
    }

    #[test]
    fn stale_lock_auto_breaks() {
        let dir = tempfile::tempdir().unwrap();
        let stale = serde_json::json!({
            "holder": "old-machine",
            "pid": 99999,
            "started_at": (Utc::now() - chrono::Duration::hours(2)).to_rfc3339(),
            "scope": "release"
        });
        std::fs::write(LockInfo::lock_path(dir.path(), "release"), stale.to_string()).unwrap();

        let lock = HostLock::acquire(dir.path(), "release", false).unwrap();
        lock.release().unwrap();
    }

    #[test]
    fn lock_file_without_holder_info_yet_blocks_acquire() {
        let dir = tempfile::tempdir().unwrap();
        // Another process has created the file and not written it yet.
        std::fs::File::create(LockInfo::lock_path(dir.path(), "release")).unwrap();

        let err = HostLock::acquire(dir.path(), "release", false).unwrap_err();
        match err {
            LockError::Held { holder, .. } => assert_eq!(holder, "unknown"),
            other => panic!("expected Held, got {other:?}"),
        }
        assert!(HostLock::acquire(dir.path(), "release", true).is_ok());
    }

    #[test]
    fn old_corrupted_lock_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let path = LockInfo::lock_path(dir.path(), "release");
        std::fs::write(&path, "not json").unwrap();
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(std::time::SystemTime::now() - Duration::from_secs(120))
            .unwrap();

        assert!(HostLock::acquire(dir.path(), "release", false).is_ok());
    }

    #[test]
    fn concurrent_acquires_have_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let barrier = std::sync::Barrier::new(8);

        let winners: Vec<HostLock> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        HostLock::acquire(dir.path(), "release", false).ok()
                    })
                })
                .collect();
            handles
                .into_iter()
                .filter_map(|h| h.join().unwrap())
                .collect()
        });

        assert_eq!(winners.len(), 1);
        let content = std::fs::read_to_string(winners[0].path()).unwrap();
        let info: LockInfo = serde_json::from_str(&content).unwrap();
        assert_eq!(info.pid, std::process::id());
    }

    #[test]
    fn no_temporary_files_are_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let lock = HostLock::acquire(dir.path(), "release", false).unwrap();
        assert!(HostLock::acquire(dir.path(), "release", false).is_err());
        lock.release().unwrap();

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn drop_removes_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let lock = HostLock::acquire(dir.path(), "release", false).unwrap();
            lock.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn with_lock_releases_after_error() {
        let dir = tempfile::tempdir().unwrap();
        let result: Result<(), LockError> =
            HostLock::with_lock(dir.path(), "release", false, async {
                Err(LockError::Io {
                    path: PathBuf::from("x"),
                    source: std::io::Error::other("boom"),
                })
            })
            .await;
        assert!(result.is_err());
        assert!(!LockInfo::lock_path(dir.path(), "release").exists());
    }
}
