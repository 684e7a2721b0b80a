// ABOUTME: Status command implementation.
// ABOUTME: Shows the recorded revision, live service state, recent releases and snapshots.

use serde::Serialize;

use safeship::config::Config;
use safeship::error::Result;
use safeship::output::Output;
use safeship::release::{ReleaseLedger, ReleaseRecord};
use safeship::snapshot::{Snapshot, SnapshotStore, TarGzArchiveStore};
use safeship::supervisor::{ProcessSupervisor, SystemctlSupervisor};
use safeship::types::Revision;

#[derive(Serialize)]
struct Status {
    service: String,
    revision: Option<Revision>,
    state: String,
    history: Vec<ReleaseRecord>,
    snapshots: Vec<Snapshot>,
}

pub async fn status(config: Config, limit: usize, output: Output) -> Result<()> {
    let ledger = ReleaseLedger::new(config.state_dir());
    let supervisor = SystemctlSupervisor::new(config.supervisor.sudo);
    let archive = TarGzArchiveStore::new(&config.backup_dir);
    let store = SnapshotStore::new(&archive, &config.app_dir, config.retention);

    let state = match supervisor.active_state(&config.service).await {
        Ok(state) => state.to_string(),
        Err(e) => {
            tracing::debug!("Could not query {}: {}", config.service, e);
            "unknown".to_string()
        }
    };
    let status = Status {
        service: config.service.to_string(),
        revision: ledger.current_revision()?,
        state,
        history: ledger.history(limit)?,
        snapshots: store.list().await?,
    };

    output.report(&status, &render(&status));
    Ok(())
}

fn render(status: &Status) -> String {
    let mut text = format!(
        "Service:  {} ({})\nRevision: {}\n",
        status.service,
        status.state,
        status
            .revision
            .as_ref()
            .map(Revision::as_tag)
            .unwrap_or("untracked")
    );

    if !status.history.is_empty() {
        text.push_str("\nRecent releases:\n");
        for record in status.history.iter().rev() {
            text.push_str(&format!(
                "  {}  {:<16} {}\n",
                record.finished_at.format("%Y-%m-%d %H:%M:%S"),
                record.revision.as_deref().unwrap_or("-"),
                record.outcome
            ));
        }
    }

    text.push_str(&format!("\nSnapshots ({}):\n", status.snapshots.len()));
    for snapshot in &status.snapshots {
        text.push_str(&format!("  {}\n", snapshot.name));
    }
    text
}
