//! Report commands

use anyhow::Result;

use crate::client::ApiClient;

/// Generate and print the full report, optionally collecting peer data
pub async fn generate_report(client: &ApiClient, cluster: bool) -> Result<()> {
    let path = if cluster { "report?cluster=true" } else { "report" };
    let text = client.get_text(path).await?;
    println!("{}", text);
    Ok(())
}

/// Print one owner's self-report
pub async fn owner_report(client: &ApiClient, owner_id: u64) -> Result<()> {
    let text = client.get_text(&format!("owners/{}/report", owner_id)).await?;
    println!("{}", text);
    Ok(())
}
