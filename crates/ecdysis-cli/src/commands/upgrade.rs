// crates/ecdysis-cli/src/commands/upgrade.rs
//
// `ecdysis upgrade {submit, list, cancel}`: upgrade management commands.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use tabled::Tabled;

use ecdysis_core::{Descriptor, PendingUpgrade, SoftwareVersion};
use ecdysis_rpc::handlers::upgrade::{
    CancelUpgradeResponse, PendingUpgradesResponse, SubmitDescriptorResponse,
};

use crate::output::{format_json, format_table};
use crate::rpc_client;

/// Upgrade management subcommands.
#[derive(Debug, Subcommand)]
pub enum UpgradeCmd {
    /// Schedule an upgrade at a future epoch.
    Submit {
        /// Upgrade name; selects the migration handler on the new binary.
        #[arg(long, required_unless_present = "file", conflicts_with = "file")]
        name: Option<String>,
        /// Epoch at which the upgrade takes effect.
        #[arg(long, required_unless_present = "file", conflicts_with = "file")]
        epoch: Option<u64>,
        /// Version of the binary that will run the upgrade (default: this CLI's version).
        #[arg(long, conflicts_with = "file")]
        target: Option<String>,
        /// Read the descriptor from a JSON file instead.
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// List pending upgrades.
    List {
        /// Print raw JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Cancel an upgrade that has not started yet.
    Cancel {
        #[arg(long)]
        name: String,
        #[arg(long)]
        epoch: u64,
    },
}

/// A row in the pending upgrades table.
#[derive(Tabled)]
struct UpgradeRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Epoch")]
    epoch: u64,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Height")]
    height: String,
    #[tabled(rename = "Stages")]
    stages: String,
    #[tabled(rename = "Submitted By")]
    submitted_by: String,
}

impl From<&PendingUpgrade> for UpgradeRow {
    fn from(pu: &PendingUpgrade) -> Self {
        let stages: Vec<String> = pu.stages.iter().map(|s| s.to_string()).collect();
        Self {
            name: pu.descriptor.name.clone(),
            epoch: pu.descriptor.epoch,
            target: pu.descriptor.target.to_string(),
            height: pu
                .upgrade_height
                .map(|h| h.to_string())
                .unwrap_or_else(|| "--".to_string()),
            stages: if stages.is_empty() {
                "--".to_string()
            } else {
                stages.join(",")
            },
            submitted_by: pu.submitting_version.to_string(),
        }
    }
}

/// Run the upgrade subcommand.
pub async fn run(endpoint: &str, cmd: &UpgradeCmd) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        UpgradeCmd::Submit {
            name,
            epoch,
            target,
            file,
        } => {
            let descriptor = match file {
                Some(path) => read_descriptor(path)?,
                None => build_descriptor(name.as_deref(), *epoch, target.as_deref())?,
            };
            descriptor.validate_basic()?;

            println!("Submitting upgrade {}...", descriptor);
            let resp: SubmitDescriptorResponse = rpc_client::call(
                endpoint,
                "upgrade/submit",
                serde_json::json!({ "descriptor": descriptor }),
            )
            .await?;
            println!(
                "Upgrade {} scheduled for epoch {} ({} pending)",
                resp.name, resp.epoch, resp.pending_count
            );
        }
        UpgradeCmd::List { json } => {
            let resp: PendingUpgradesResponse =
                rpc_client::call(endpoint, "upgrade/pending", serde_json::json!({})).await?;
            if *json {
                println!("{}", format_json(&resp.upgrades));
            } else if resp.upgrades.is_empty() {
                println!("No pending upgrades.");
            } else {
                let rows: Vec<UpgradeRow> = resp.upgrades.iter().map(UpgradeRow::from).collect();
                println!("{}", format_table(&rows));
            }
        }
        UpgradeCmd::Cancel { name, epoch } => {
            let descriptor = Descriptor::new(name.clone(), *epoch, SoftwareVersion::default());
            let resp: CancelUpgradeResponse = rpc_client::call(
                endpoint,
                "upgrade/cancel",
                serde_json::json!({ "descriptor": descriptor }),
            )
            .await?;
            if resp.cancelled {
                println!("Cancelled upgrade {} at epoch {}", name, epoch);
            } else {
                println!("No pending upgrade {} at epoch {}", name, epoch);
            }
        }
    }

    Ok(())
}

/// Build a descriptor from command-line flags.
fn build_descriptor(
    name: Option<&str>,
    epoch: Option<u64>,
    target: Option<&str>,
) -> Result<Descriptor, Box<dyn std::error::Error>> {
    let name = name.ok_or("--name is required")?;
    let epoch = epoch.ok_or("--epoch is required")?;
    let target: SoftwareVersion = target.unwrap_or(env!("CARGO_PKG_VERSION")).parse()?;
    Ok(Descriptor::new(name, epoch, target))
}

/// Read a JSON-encoded descriptor from disk.
fn read_descriptor(path: &Path) -> Result<Descriptor, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let descriptor: Descriptor = serde_json::from_str(&contents)
        .map_err(|e| format!("invalid descriptor in {}: {}", path.display(), e))?;
    Ok(descriptor)
}
