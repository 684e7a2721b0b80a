// ABOUTME: Test gate capability run before a release may touch the host.
// ABOUTME: The command implementation runs a shell command inside a staged copy of the candidate.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{GateConfig, resolve_env_map};
use crate::error::Result;
use crate::exec::{CommandOutput, CommandSpec, ExecError};
use crate::types::Revision;

/// Environment variable naming the revision under test.
pub const REVISION_ENV: &str = "SAFESHIP_REVISION";

/// Environment variable naming the live application directory, for gates
/// that need its virtualenv or other untracked tooling.
pub const APP_DIR_ENV: &str = "SAFESHIP_APP_DIR";

/// Runs the test suite for a candidate revision staged at `workdir`. Any
/// unsuccessful output blocks the release.
#[async_trait]
pub trait TestGate: Send + Sync {
    async fn run(
        &self,
        revision: &Revision,
        workdir: &Path,
    ) -> std::result::Result<CommandOutput, ExecError>;
}

/// `sh -c <command>` in the staged tree with `SAFESHIP_REVISION` and
/// `SAFESHIP_APP_DIR` set.
#[derive(Debug, Clone)]
pub struct CommandGate {
    command: String,
    app_dir: PathBuf,
    timeout: Duration,
    env: BTreeMap<String, String>,
}

impl CommandGate {
    /// Build from config, resolving `{env: VAR}` references up front so a
    /// missing variable fails before anything runs.
    pub fn from_config(config: &GateConfig, app_dir: &Path) -> Result<Self> {
        Ok(Self {
            command: config.command.clone(),
            app_dir: app_dir.to_path_buf(),
            timeout: config.timeout,
            env: resolve_env_map(&config.env)?,
        })
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[async_trait]
impl TestGate for CommandGate {
    async fn run(
        &self,
        revision: &Revision,
        workdir: &Path,
    ) -> std::result::Result<CommandOutput, ExecError> {
        let mut spec = CommandSpec::shell(&self.command)
            .current_dir(workdir)
            .timeout(self.timeout)
            .env(REVISION_ENV, revision.as_tag())
            .env(APP_DIR_ENV, self.app_dir.to_string_lossy());
        for (key, value) in &self.env {
            spec = spec.env(key, value);
        }
        spec.run().await
    }
}
