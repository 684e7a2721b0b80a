// ABOUTME: Validated domain types shared across the crate.
// ABOUTME: Revisions, supervisor unit names, and network protocol vocabulary.

mod protocol;
mod revision;
mod service_name;

pub use protocol::{ParseProtocolError, Protocol};
pub use revision::{ParseRevisionError, Revision};
pub use service_name::{ServiceName, ServiceNameError};
