//! Daemon control and cluster push commands

use anyhow::Result;
use colored::Colorize;

use crate::client::{ApiClient, PushOverrideRequest, PushResponse, StatusSummary};
use crate::output::{color_enabled, print_success, OutputFormat};

/// Show daemon status
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status: StatusSummary = client.get("status").await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        OutputFormat::Table => {
            println!("{}", "Warden status".bold());
            println!("{}", "=".repeat(50));
            println!("Enforcement:            {}", color_enabled(status.enabled));
            println!("Node id:                {}", status.node_id);
            println!("Owners tracked:         {}", status.owners_tracked);
            println!("Units tracked:          {}", status.units_tracked);
            println!(
                "Cluster:                {}",
                color_enabled(status.cluster_enabled)
            );
            println!("Peers known:            {}", status.peers_known);
        }
    }

    Ok(())
}

/// Enable or disable enforcement
pub async fn set_enabled(client: &ApiClient, enabled: bool) -> Result<()> {
    let path = if enabled { "enable" } else { "disable" };
    client.post_empty(path).await?;
    print_success(&format!(
        "Warden {}",
        if enabled { "enabled" } else { "disabled" }
    ));
    Ok(())
}

/// Push the node's settings to all peers
pub async fn push_settings(client: &ApiClient) -> Result<()> {
    let _: PushResponse = client
        .post("cluster/push-settings", &serde_json::json!({}))
        .await?;
    print_success("Settings pushed to cluster");
    Ok(())
}

/// Push one owner's privileged override to all peers
pub async fn push_override(client: &ApiClient, owner_id: u64) -> Result<()> {
    let _: PushResponse = client
        .post(
            "cluster/push-override",
            &PushOverrideRequest { owner_id },
        )
        .await?;
    print_success(&format!("Override for owner {} pushed to cluster", owner_id));
    Ok(())
}
