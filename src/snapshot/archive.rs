// ABOUTME: Archive storage capability and its gzip-compressed tar implementation.
// ABOUTME: Archives are written under a .partial name and renamed only when complete.

use async_trait::async_trait;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use super::SnapshotError;

const EXTENSION: &str = ".tar.gz";
const PARTIAL_SUFFIX: &str = ".partial";

/// Storage for named tree archives.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Names of complete archives, in no particular order.
    async fn list(&self) -> Result<Vec<String>, SnapshotError>;

    /// Archive the whole tree at `source` under `name`. On error nothing is
    /// left that `list` would return.
    async fn write(&self, name: &str, source: &Path) -> Result<(), SnapshotError>;

    /// Unpack `name` into `dest`, which is created if missing.
    async fn extract(&self, name: &str, dest: &Path) -> Result<(), SnapshotError>;

    async fn remove(&self, name: &str) -> Result<(), SnapshotError>;
}

/// `<dir>/<name>.tar.gz` archives.
#[derive(Debug, Clone)]
pub struct TarGzArchiveStore {
    dir: PathBuf,
}

impl TarGzArchiveStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn archive_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}{}", name, EXTENSION))
    }
}

async fn blocking<T, F>(f: F) -> Result<T, SnapshotError>
where
    F: FnOnce() -> Result<T, SnapshotError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SnapshotError::Task(e.to_string()))?
}

#[async_trait]
impl ArchiveStore for TarGzArchiveStore {
    async fn list(&self) -> Result<Vec<String>, SnapshotError> {
        let dir = self.dir.clone();
        blocking(move || {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(source) => return Err(SnapshotError::List { dir, source }),
            };

            let mut names = Vec::new();
            for entry in entries {
                let entry = entry.map_err(|source| SnapshotError::List {
                    dir: dir.clone(),
                    source,
                })?;
                let file_name = entry.file_name().to_string_lossy().into_owned();
                if let Some(name) = file_name.strip_suffix(EXTENSION) {
                    names.push(name.to_string());
                }
            }
            Ok(names)
        })
        .await
    }

    async fn write(&self, name: &str, source: &Path) -> Result<(), SnapshotError> {
        let final_path = self.archive_path(name);
        let partial = PathBuf::from(format!("{}{}", final_path.display(), PARTIAL_SUFFIX));
        let dir = self.dir.clone();
        let source = source.to_path_buf();
        let name = name.to_string();

        blocking(move || {
            let result = (|| -> io::Result<()> {
                fs::create_dir_all(&dir)?;
                let file = File::create(&partial)?;
                let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
                builder.follow_symlinks(false);
                builder.append_dir_all(".", &source)?;
                let file = builder.into_inner()?.finish()?;
                file.sync_all()?;
                fs::rename(&partial, &final_path)
            })();

            result.map_err(|source| {
                let _ = fs::remove_file(&partial);
                SnapshotError::Write { name, source }
            })
        })
        .await
    }

    async fn extract(&self, name: &str, dest: &Path) -> Result<(), SnapshotError> {
        let path = self.archive_path(name);
        let dest = dest.to_path_buf();
        let name = name.to_string();

        blocking(move || {
            let result = (|| -> io::Result<()> {
                fs::create_dir_all(&dest)?;
                let mut archive = tar::Archive::new(GzDecoder::new(File::open(&path)?));
                archive.set_preserve_permissions(true);
                archive.set_overwrite(true);
                archive.unpack(&dest)
            })();
            result.map_err(|source| SnapshotError::Extract { name, source })
        })
        .await
    }

    async fn remove(&self, name: &str) -> Result<(), SnapshotError> {
        let path = self.archive_path(name);
        let name = name.to_string();
        blocking(move || fs::remove_file(&path).map_err(|source| SnapshotError::Remove { name, source }))
            .await
    }
}
