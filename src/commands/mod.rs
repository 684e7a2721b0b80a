// ABOUTME: Command module aggregator for the safeship CLI.
// ABOUTME: One handler per subcommand; host.rs wires the real capabilities.

mod audit;
mod firewall;
mod host;
mod release;
mod rollback;
mod snapshots;
mod status;

pub use audit::audit;
pub use firewall::firewall;
pub use release::release;
pub use rollback::rollback;
pub use snapshots::snapshots;
pub use status::status;
