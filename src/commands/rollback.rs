// ABOUTME: Rollback command implementation.
// ABOUTME: Puts the most recent snapshot back live and restarts the service.

use super::host::{Host, ProgressObserver};
use safeship::config::Config;
use safeship::diagnostics::Diagnostics;
use safeship::error::Result;
use safeship::output::Output;
use safeship::release::manual_rollback;

pub async fn rollback(config: Config, force: bool, mut output: Output) -> Result<()> {
    let host = Host::new(config)?;
    let snapshots = host.snapshots();
    output.start_timer();
    let observer = ProgressObserver::new(&output);
    let cx = host.context(&snapshots, &observer);
    let mut diag = Diagnostics::default();

    output.progress(&format!("Rolling back {}", host.config.service));
    let result = manual_rollback(&cx, force, &mut diag).await;
    output.warnings(&diag);

    let restored = result?;
    output.success(&format!(
        "Restored {} ({})",
        restored.name,
        restored.revision_label()
    ));
    Ok(())
}
