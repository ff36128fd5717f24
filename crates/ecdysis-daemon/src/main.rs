// crates/ecdysis-daemon/src/main.rs
//
// Binary entrypoint for the Ecdysis node daemon.
//
// Initializes tracing, parses CLI arguments, loads configuration, restores
// pending upgrades, runs startup migrations, and then drives the chain until
// an upgrade halts the node or the operator stops it.
//
// Exit codes: 0 on graceful shutdown, 1 on a fatal error, 2 when the node
// halted at an upgrade height and needs its binary replaced.

mod chain;
mod config;
mod scheduler;
mod state;

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::sync::RwLock;

use config::{ConfigError, DaemonConfig};
use scheduler::{BlockDriver, DriverExit};
use state::{NodeState, NodeStateMachine};

use chain::ChainState;
use ecdysis_core::{EcdysisError, SoftwareVersion};
use ecdysis_rpc::{EcdysisRpcServer, NodeStatus, RpcConfig};
use ecdysis_store::RocksStore;
use ecdysis_upgrade::{DummyHandler, MigrationRegistry, UpgradeManager, DUMMY_UPGRADE_NAME};

/// Exit code reported when the node stops for an upgrade.
const EXIT_UPGRADE_HALT: i32 = 2;
/// Exit code reported on a fatal error.
const EXIT_FATAL: i32 = 1;

/// Ecdysis daemon: runs a node that sheds its binary at agreed epochs.
#[derive(Parser, Debug)]
#[command(name = "ecdysis-daemon", version, about = "Ecdysis node daemon")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "~/.ecdysis/config.toml")]
    config: String,

    /// Override the configured data directory.
    #[arg(long)]
    data_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration from TOML file, falling back to defaults only if the
    // file cannot be read. Logged once tracing is up.
    let config_path = expand_tilde(&args.config);
    let loaded = DaemonConfig::load(&config_path);
    let mut daemon_config = match &loaded {
        Ok(cfg) => cfg.clone(),
        Err(_) => DaemonConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&daemon_config.log_level)),
        )
        .init();

    match loaded {
        Ok(_) => tracing::info!("Loaded configuration from {}", config_path),
        Err(e @ ConfigError::Unreadable { .. }) => {
            tracing::warn!("{}. Using defaults.", e)
        }
        Err(e @ ConfigError::Invalid(_)) => {
            tracing::error!("Refusing to start with {}: {}", config_path, e);
            std::process::exit(EXIT_FATAL);
        }
    }

    // CLI --data-dir flag overrides the config file value.
    if let Some(data_dir) = args.data_dir {
        daemon_config.data_dir = data_dir;
    }

    match run(daemon_config).await {
        Ok(DriverExit::Shutdown) => {
            tracing::info!("Ecdysis daemon shut down gracefully");
            Ok(())
        }
        Ok(DriverExit::Halted { name, epoch, height }) => {
            tracing::warn!(
                name = %name,
                epoch,
                height,
                "node halted for upgrade, replace the binary and restart"
            );
            std::process::exit(EXIT_UPGRADE_HALT);
        }
        Err(e) => {
            match e.downcast_ref::<EcdysisError>() {
                Some(err) if err.is_fatal() => tracing::error!(
                    "Fatal upgrade error, this binary cannot run the scheduled upgrade: {}",
                    err
                ),
                _ => tracing::error!("Fatal: {}", e),
            }
            std::process::exit(EXIT_FATAL);
        }
    }
}

/// Bring the node up and drive it until it halts or is stopped.
async fn run(daemon_config: DaemonConfig) -> Result<DriverExit, Box<dyn std::error::Error>> {
    daemon_config.validate()?;
    let running_version: SoftwareVersion = env!("CARGO_PKG_VERSION").parse()?;
    let data_dir = expand_tilde(&daemon_config.data_dir);

    tracing::info!("Ecdysis Daemon v{}", running_version);
    tracing::info!("Data directory: {}", data_dir);
    tracing::info!(
        "RPC endpoint: {}:{}",
        daemon_config.rpc_host,
        daemon_config.rpc_port
    );
    tracing::info!("Blocks per epoch: {}", daemon_config.blocks_per_epoch);

    let mut state_machine = NodeStateMachine::new();
    let start_time = Instant::now();

    let rocksdb_path = format!("{}/db", data_dir);
    let store = Arc::new(RocksStore::open(&rocksdb_path)?);

    // Restore pending upgrades. Refuses to start if a due upgrade cannot be
    // run by this binary.
    let manager = Arc::new(UpgradeManager::new(
        store.clone(),
        data_dir.clone(),
        running_version,
        Arc::new(build_registry()?),
    )?);

    state_machine.transition(NodeState::Upgrading)?;
    if let Err(e) = manager.startup_upgrade() {
        let _ = manager.close();
        return Err(e.into());
    }
    state_machine.transition(NodeState::Running)?;

    let status = Arc::new(RwLock::new(NodeStatus::default()));

    // Spawn RPC server in background.
    let rpc_config = RpcConfig {
        host: daemon_config.rpc_host.clone(),
        port: daemon_config.rpc_port,
    };
    let rpc_server = EcdysisRpcServer::new(rpc_config, manager.clone())
        .with_status(status.clone())
        .with_handler_names(manager.registry().names())
        .with_version(running_version.to_string())
        .with_start_time(start_time);
    tokio::spawn(async move {
        if let Err(e) = rpc_server.start().await {
            tracing::error!("RPC server error: {}", e);
        }
    });

    let mut driver = BlockDriver::new(
        store,
        manager.clone(),
        daemon_config.blocks_per_epoch,
        status.clone(),
    )?;
    {
        let mut s = status.write().await;
        s.state = state_machine.current.to_string();
        s.height = driver.committed_height();
        s.epoch = driver.epoch_at(driver.committed_height());
    }

    let exit = driver
        .run(Duration::from_millis(daemon_config.block_interval_ms))
        .await;

    if matches!(exit, Ok(DriverExit::Halted { .. })) {
        state_machine.transition(NodeState::Halted)?;
    }
    let _ = state_machine.transition(NodeState::ShuttingDown);
    status.write().await.state = state_machine.current.to_string();

    let closed = manager.close();
    let exit = exit?;
    closed?;
    Ok(exit)
}

/// Migration handlers compiled into this binary.
fn build_registry() -> Result<MigrationRegistry<ChainState>, EcdysisError> {
    let mut registry = MigrationRegistry::new();
    registry.register(DUMMY_UPGRADE_NAME, Arc::new(DummyHandler))?;
    Ok(registry)
}

/// Expand a leading `~` in a path to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}/{}", home.display(), rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home.display().to_string();
        }
    }
    path.to_string()
}
