// ABOUTME: Snapshots command implementation.
// ABOUTME: Lists retained snapshot archives, newest first.

use safeship::config::Config;
use safeship::error::Result;
use safeship::output::Output;
use safeship::snapshot::{SnapshotStore, TarGzArchiveStore};

pub async fn snapshots(config: Config, output: Output) -> Result<()> {
    let archive = TarGzArchiveStore::new(&config.backup_dir);
    let store = SnapshotStore::new(&archive, &config.app_dir, config.retention);
    let snapshots = store.list().await?;

    let mut text = String::new();
    if snapshots.is_empty() {
        text.push_str("No snapshots\n");
    }
    for snapshot in &snapshots {
        text.push_str(&format!(
            "{}  {:<16} {}\n",
            snapshot.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            snapshot.revision_label(),
            snapshot.name
        ));
    }
    output.report(&snapshots, &text);
    Ok(())
}
