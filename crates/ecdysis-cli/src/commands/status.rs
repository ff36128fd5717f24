// crates/ecdysis-cli/src/commands/status.rs
//
// `ecdysis status`: display node state, height, and health.

use ecdysis_rpc::handlers::node::{GetHealthResponse, GetNodeInfoResponse};

use crate::rpc_client;

/// Run the status command.
pub async fn run(endpoint: &str) -> Result<(), Box<dyn std::error::Error>> {
    let info: GetNodeInfoResponse =
        rpc_client::call(endpoint, "node/info", serde_json::json!({})).await?;
    let health: GetHealthResponse =
        rpc_client::call(endpoint, "node/health", serde_json::json!({})).await?;

    println!("Ecdysis node v{}", info.version);
    println!();
    println!("Node Status");
    println!("-----------");
    println!("  RPC endpoint: {}", endpoint);
    println!("  State:        {}", info.state);
    println!("  Height:       {}", info.height);
    println!("  Epoch:        {}", info.epoch);
    println!("  Uptime:       {}s", info.uptime_seconds);
    println!("  Health:       {}", health.status);
    println!("  Pending:      {}", health.pending_upgrades);
    println!("  Handlers:     {}", info.handlers.join(", "));
    if let Some(details) = health.details {
        println!();
        println!("{}", details);
    }

    Ok(())
}
