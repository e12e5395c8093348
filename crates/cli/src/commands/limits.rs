//! Limit inspection commands

use anyhow::Result;
use colored::Colorize;

use crate::client::{ApiClient, EffectiveLimits};
use crate::output::OutputFormat;

/// Show the thresholds in effect for one owner
pub async fn show_limits(client: &ApiClient, owner_id: u64, format: OutputFormat) -> Result<()> {
    let limits: EffectiveLimits = client.get(&format!("owners/{}/limits", owner_id)).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&limits)?);
        }
        OutputFormat::Table => {
            println!("{}", format!("Limits for owner {}", owner_id).bold());
            println!("{}", "=".repeat(50));
            if limits.privileged {
                println!("Privilege:              {}", "privileged override".cyan());
            } else {
                println!("Privilege:              {}", "global defaults".dimmed());
            }
            println!("Single run:             {:.3} ms", limits.max_run_time_ms);
            println!("Average:                {:.3} ms", limits.max_run_time_avg_ms);
            println!(
                "Combined run:           {:.3} ms",
                limits.max_combined_run_time_ms
            );
            println!(
                "Combined average:       {:.3} ms",
                limits.max_combined_avg_ms
            );
            println!("Offense budget:         {}", limits.max_offenses);
            println!("Punishment:             {}", limits.punishment.yellow());
            println!(
                "Graceful shutdown:      {} s",
                limits.graceful_shutdown_delay_secs
            );
            println!("Startup grace:          {} s", limits.startup_grace_secs);
        }
    }

    Ok(())
}
