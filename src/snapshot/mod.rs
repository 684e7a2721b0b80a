// ABOUTME: Point-in-time archives of the deployed application tree.
// ABOUTME: Exports the archive capability, the store, and tree digest helpers.

mod archive;
mod error;
mod store;
pub mod tree;

pub use archive::{ArchiveStore, TarGzArchiveStore};
pub use error::SnapshotError;
pub use store::{Snapshot, SnapshotHandle, SnapshotStore, select_evictions, sort_newest_first};
