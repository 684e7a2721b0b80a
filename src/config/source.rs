// ABOUTME: Where new revisions come from.
// ABOUTME: Either a git checkout of the tag in place, or a per-tag release directory.

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    /// `app_dir` is a git work tree; releases fetch and check out the tag.
    Git {
        #[serde(default = "default_remote")]
        remote: String,
    },
    /// Each revision is unpacked at `<path>/<tag>`; releases replace the
    /// live tree with that directory's contents.
    Directory {
        path: PathBuf,
        /// Top-level entries of the live tree left in place on update
        /// (virtualenvs, uploaded data).
        #[serde(default)]
        preserve: Vec<String>,
    },
}

fn default_remote() -> String {
    "origin".to_string()
}
