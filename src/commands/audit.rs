// ABOUTME: Audit command implementation.
// ABOUTME: Probes the configured host and returns the issue count as the exit code.

use safeship::audit::{TcpProbe, audit as run_audit};
use safeship::config::Config;
use safeship::error::Result;
use safeship::output::Output;

/// Returns the process exit code: the number of issues, capped at 254.
/// Errors exit with `AUDIT_FAILED_EXIT` instead.
pub async fn audit(config: Config, host: Option<String>, output: Output) -> Result<u8> {
    let settings = config.audit()?;
    let host = host.unwrap_or_else(|| settings.host.clone());

    let report = run_audit(
        &TcpProbe,
        &host,
        &settings.expected_open(),
        &settings.expected_closed(),
        settings.timeout,
        settings.concurrency,
    )
    .await?;

    let mut text = format!("{} ({})\n", report.host, report.address);
    for finding in &report.findings {
        text.push_str(&format!("{finding}\n"));
    }
    output.report(&report, &text);

    let issues = report.issue_count();
    if issues == 0 {
        output.success("No unexpected exposure");
    } else {
        output.error(&format!("{issues} exposure issue(s)"));
    }
    Ok(report.exit_code())
}
