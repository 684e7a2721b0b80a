// ABOUTME: Error types for local command execution.
// ABOUTME: Covers spawn failures and commands that outlive their timeout.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
}

pub type Result<T> = std::result::Result<T, ExecError>;
