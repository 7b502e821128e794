//! One-shot attribution sweep

use colored::Colorize;

use crate::attribution::{AttributionSweep, FingerprintMatcher};
use crate::config::StaticConfig;
use crate::interfaces::cli::CliError;
use crate::storage::Stores;

pub async fn run_sweep(config: &StaticConfig, stores: Stores) -> Result<(), CliError> {
    let matcher = FingerprintMatcher::new(&stores, &config.attribution, &config.fraud);
    let sweep = AttributionSweep::new(stores.events.clone(), matcher, &config.sweep);

    let report = sweep
        .run_once()
        .await
        .map_err(|e| CliError::CommandError(format!("Sweep failed: {}", e)))?;

    if report.scanned == 0 {
        println!("{} No unattributed opens", "ℹ".bold().blue());
        return Ok(());
    }

    println!("{}", "Sweep report:".bold().green());
    println!("  scanned    {}", report.scanned.to_string().cyan());
    println!("  matched    {}", report.matched.to_string().green());
    println!("  unmatched  {}", report.unmatched.to_string().yellow());
    println!("  deferred   {}", report.deferred.to_string().dimmed());
    if report.failed > 0 {
        println!("  failed     {}", report.failed.to_string().red());
    }
    Ok(())
}
