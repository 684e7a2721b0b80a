// ABOUTME: Release command implementation.
// ABOUTME: Runs one tagged release on this host and reports the outcome.

use super::host::{Host, ProgressObserver};
use safeship::config::Config;
use safeship::diagnostics::Diagnostics;
use safeship::error::Result;
use safeship::output::{Output, OutputMode};
use safeship::release::run_release;
use safeship::types::Revision;

pub async fn release(config: Config, tag: &str, force: bool, mut output: Output) -> Result<()> {
    let revision = Revision::parse(tag)?;
    let host = Host::new(config)?;
    let snapshots = host.snapshots();
    output.start_timer();
    let observer = ProgressObserver::new(&output);
    let cx = host.context(&snapshots, &observer);
    let mut diag = Diagnostics::default();

    output.progress(&format!("Releasing {} as {}", revision, host.config.service));
    let result = run_release(&cx, revision, force, &mut diag).await;
    output.warnings(&diag);

    let summary = result?;
    let mut text = String::new();
    if let Some(previous) = &summary.previous {
        text.push_str(&format!("  previous: {previous}\n"));
    }
    text.push_str(&format!("  snapshot: {}\n", summary.snapshot));
    if summary.dependencies_synced {
        text.push_str("  dependencies re-synced\n");
    }
    for evicted in &summary.evicted {
        text.push_str(&format!("  evicted:  {evicted}\n"));
    }
    match output.mode() {
        OutputMode::Json => output.report(&summary, ""),
        _ => output.progress(text.trim_end()),
    }
    output.success(&format!("Released {}", summary.revision));
    Ok(())
}
