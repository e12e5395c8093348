//! Runtime inspection commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, EffectiveLimits, UnitRuntimes};
use crate::output::{color_duration, print_table, OutputFormat};

#[derive(Tabled, serde::Serialize)]
struct RuntimeRow {
    #[tabled(rename = "Unit")]
    unit: String,
    #[tabled(rename = "Grid")]
    grid: String,
    #[tabled(rename = "Node")]
    node: u64,
    #[tabled(rename = "Last")]
    last: String,
    #[tabled(rename = "Average")]
    average: String,
    #[tabled(rename = "Offenses")]
    offenses: u32,
    #[tabled(rename = "Recompiles")]
    recompiles: u32,
}

/// Show per-unit runtimes for one owner
pub async fn show_runtimes(client: &ApiClient, owner_id: u64, format: OutputFormat) -> Result<()> {
    let units: Vec<UnitRuntimes> = client.get(&format!("owners/{}/runtimes", owner_id)).await?;

    if matches!(format, OutputFormat::Json) {
        println!("{}", serde_json::to_string_pretty(&units)?);
        return Ok(());
    }

    let limits: EffectiveLimits = client.get(&format!("owners/{}/limits", owner_id)).await?;

    let rows: Vec<RuntimeRow> = units
        .iter()
        .map(|u| RuntimeRow {
            unit: format!("{} ({})", u.unit_name, u.unit_id),
            grid: u.grid_name.clone(),
            node: u.node_id,
            last: color_duration(u.last_duration_ms, limits.max_run_time_ms),
            average: color_duration(u.avg_duration_ms, limits.max_run_time_avg_ms),
            offenses: u.offenses,
            recompiles: u.recompiles,
        })
        .collect();

    print_table(&rows, format);
    Ok(())
}
