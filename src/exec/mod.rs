// ABOUTME: Local process execution for the system utilities safeship drives.
// ABOUTME: systemctl, ufw, git, the test gate and dependency installs all run through here.

mod command;
mod error;

pub use command::{CommandOutput, CommandSpec};
pub use error::{ExecError, Result};
