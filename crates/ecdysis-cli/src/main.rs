// crates/ecdysis-cli/src/main.rs
//
// CLI entrypoint for Ecdysis operator tools.
//
// Provides subcommands for scheduling, listing, and cancelling coordinated
// upgrades on a running node, and for checking node status.

mod commands;
mod output;
mod rpc_client;

use clap::{Parser, Subcommand};
use commands::upgrade::UpgradeCmd;

/// Ecdysis CLI: operator tools for coordinated binary upgrades.
#[derive(Parser, Debug)]
#[command(name = "ecdysis", version, about = "Ecdysis operator CLI")]
struct Cli {
    /// RPC endpoint for the ecdysis-daemon.
    #[arg(long, global = true, default_value = "http://localhost:50052")]
    rpc: String,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Upgrade management: submit, list, cancel.
    #[command(subcommand)]
    Upgrade(UpgradeCmd),

    /// Display node state, height, and health.
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Upgrade(cmd) => commands::upgrade::run(&cli.rpc, cmd).await?,
        Commands::Status => commands::status::run(&cli.rpc).await?,
    }

    Ok(())
}
