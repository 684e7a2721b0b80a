// ABOUTME: Release ledger kept in the state directory.
// ABOUTME: Current revision, dependency manifest digest, and a JSON-lines release history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::types::Revision;

use super::error::ReleaseError;

const CURRENT_REVISION: &str = "current-revision";
const DEPENDENCY_DIGEST: &str = "dependencies.sha256";
const HISTORY: &str = "history.jsonl";

/// How a release or rollback ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseOutcome {
    Released,
    /// Test gate or snapshot failed; host untouched.
    Rejected,
    RolledBack,
    RollbackFailed,
    ManualRollback,
}

impl ReleaseOutcome {
    pub fn for_error(err: &ReleaseError) -> Self {
        match err {
            ReleaseError::RolledBack { .. } => ReleaseOutcome::RolledBack,
            _ if err.host_unchanged() => ReleaseOutcome::Rejected,
            _ => ReleaseOutcome::RollbackFailed,
        }
    }
}

impl std::fmt::Display for ReleaseOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReleaseOutcome::Released => "released",
            ReleaseOutcome::Rejected => "rejected",
            ReleaseOutcome::RolledBack => "rolled back",
            ReleaseOutcome::RollbackFailed => "rollback failed",
            ReleaseOutcome::ManualRollback => "manual rollback",
        };
        f.write_str(s)
    }
}

/// One line of `history.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    /// Revision released, or restored by a manual rollback.
    pub revision: Option<String>,
    pub outcome: ReleaseOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReleaseLedger {
    dir: PathBuf,
}

impl ReleaseLedger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Revision recorded by the last successful release. An unreadable
    /// value is logged and treated as untracked.
    pub fn current_revision(&self) -> Result<Option<Revision>, ReleaseError> {
        let Some(raw) = self.read(CURRENT_REVISION)? else {
            return Ok(None);
        };
        match Revision::parse(raw.trim()) {
            Ok(rev) => Ok(Some(rev)),
            Err(e) => {
                tracing::warn!("Ignoring unreadable recorded revision {:?}: {}", raw.trim(), e);
                Ok(None)
            }
        }
    }

    pub fn set_current_revision(&self, revision: Option<&Revision>) -> Result<(), ReleaseError> {
        self.write(CURRENT_REVISION, revision.map(Revision::as_tag))
    }

    pub fn dependency_digest(&self) -> Result<Option<String>, ReleaseError> {
        Ok(self
            .read(DEPENDENCY_DIGEST)?
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty()))
    }

    pub fn set_dependency_digest(&self, digest: Option<&str>) -> Result<(), ReleaseError> {
        self.write(DEPENDENCY_DIGEST, digest)
    }

    pub fn append(&self, record: &ReleaseRecord) -> Result<(), ReleaseError> {
        let path = self.dir.join(HISTORY);
        let line = serde_json::to_string(record).map_err(|e| self.error(HISTORY, e.into()))?;
        fs::create_dir_all(&self.dir).map_err(|e| self.error(HISTORY, e))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| self.error(HISTORY, e))?;
        writeln!(file, "{}", line).map_err(|e| self.error(HISTORY, e))
    }

    /// The most recent `limit` records, oldest first. Malformed lines are skipped.
    pub fn history(&self, limit: usize) -> Result<Vec<ReleaseRecord>, ReleaseError> {
        let Some(content) = self.read(HISTORY)? else {
            return Ok(Vec::new());
        };
        let records: Vec<ReleaseRecord> = content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| match serde_json::from_str(l) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::debug!("Skipping malformed history line: {}", e);
                    None
                }
            })
            .collect();
        let skip = records.len().saturating_sub(limit);
        Ok(records.into_iter().skip(skip).collect())
    }

    fn read(&self, name: &str) -> Result<Option<String>, ReleaseError> {
        match fs::read_to_string(self.dir.join(name)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.error(name, e)),
        }
    }

    /// Replace a value file atomically; `None` removes it.
    fn write(&self, name: &str, value: Option<&str>) -> Result<(), ReleaseError> {
        let path = self.dir.join(name);
        let Some(value) = value else {
            return match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(self.error(name, e)),
            };
        };

        fs::create_dir_all(&self.dir).map_err(|e| self.error(name, e))?;
        let tmp = self.dir.join(format!(".{}.tmp", name));
        fs::write(&tmp, format!("{}\n", value)).map_err(|e| self.error(name, e))?;
        fs::rename(&tmp, &path).map_err(|e| self.error(name, e))
    }

    fn error(&self, name: &str, source: io::Error) -> ReleaseError {
        ReleaseError::Ledger {
            path: self.dir.join(name),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(revision: &str, outcome: ReleaseOutcome) -> ReleaseRecord {
        let now = Utc::now();
        ReleaseRecord {
            revision: Some(revision.to_string()),
            outcome,
            snapshot: None,
            started_at: now,
            finished_at: now,
            message: None,
        }
    }

    #[test]
    fn revision_round_trips_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ReleaseLedger::new(dir.path().join("state"));
        assert_eq!(ledger.current_revision().unwrap(), None);

        let rev = Revision::parse("v1.2.0").unwrap();
        ledger.set_current_revision(Some(&rev)).unwrap();
        assert_eq!(ledger.current_revision().unwrap(), Some(rev));

        ledger.set_current_revision(None).unwrap();
        assert_eq!(ledger.current_revision().unwrap(), None);
    }

    #[test]
    fn garbage_revision_reads_as_untracked() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CURRENT_REVISION), "not-a-version\n").unwrap();
        let ledger = ReleaseLedger::new(dir.path());
        assert_eq!(ledger.current_revision().unwrap(), None);
    }

    #[test]
    fn history_keeps_last_records_and_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ReleaseLedger::new(dir.path());
        ledger.append(&record("1.0.0", ReleaseOutcome::Released)).unwrap();
        fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join(HISTORY))
            .unwrap()
            .write_all(b"{broken\n")
            .unwrap();
        ledger.append(&record("1.1.0", ReleaseOutcome::RolledBack)).unwrap();
        ledger.append(&record("1.2.0", ReleaseOutcome::Released)).unwrap();

        let history = ledger.history(2).unwrap();
        let revisions: Vec<_> = history
            .iter()
            .map(|r| r.revision.as_deref().unwrap())
            .collect();
        assert_eq!(revisions, vec!["1.1.0", "1.2.0"]);
        assert_eq!(history[0].outcome, ReleaseOutcome::RolledBack);
    }
}
