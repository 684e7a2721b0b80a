// ABOUTME: Firewall command implementation.
// ABOUTME: Confirms lockout risk interactively, then reconciles the configured port under the firewall lock.

use std::io::{BufRead, IsTerminal, Write};

use safeship::config::Config;
use safeship::diagnostics::{Diagnostics, Warning};
use safeship::error::{Error, Result};
use safeship::firewall::{LockoutGuard, UfwPacketFilter, reconcile_locked};
use safeship::output::Output;

pub async fn firewall(config: Config, yes: bool, force: bool, mut output: Output) -> Result<()> {
    let settings = config.firewall()?;
    output.start_timer();
    let mut diag = Diagnostics::default();

    let mut guard = LockoutGuard::from_env(yes);
    if let Some(address) = guard.at_risk(&settings.allow)
        && !yes
        && std::io::stdin().is_terminal()
    {
        if !confirm(&format!(
            "Your session comes from {address}, which is not in firewall.allow. Continue? [y/N] "
        ))? {
            return Err(Error::Aborted("firewall unchanged".to_string()));
        }
        guard = LockoutGuard::new(guard.session(), true);
    }

    output.progress(&format!(
        "Reconciling {}/{} to {} address(es)",
        settings.port,
        settings.protocol,
        settings.allow.len()
    ));
    let filter = UfwPacketFilter::new(settings.sudo);
    let report = reconcile_locked(
        &config.state_dir(),
        force,
        &filter,
        settings.port,
        settings.protocol,
        &settings.allow,
        &guard,
    )
    .await?;

    if let Some(address) = report.lockout_override {
        diag.warn(Warning::lockout_override(format!(
            "port {} no longer admits your session address {}",
            settings.port, address
        )));
    }
    if !report.filter_active {
        output.warning("ufw is inactive; rules are stored but not enforced");
    }

    let mut text = String::new();
    for rule in &report.removed {
        text.push_str(&format!("  - {rule}\n"));
    }
    for address in &report.added {
        text.push_str(&format!("  + allow {address}\n"));
    }
    output.report(&report, &text);
    output.warnings(&diag);

    if report.changed() {
        output.success(&format!(
            "Port {}: removed {}, added {}",
            settings.port,
            report.removed.len(),
            report.added.len()
        ));
    } else {
        output.success(&format!("Port {} already matches the allow-list", settings.port));
    }
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    let mut stderr = std::io::stderr();
    write!(stderr, "{prompt}")?;
    stderr.flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
