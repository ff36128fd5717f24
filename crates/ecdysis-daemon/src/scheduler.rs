// crates/ecdysis-daemon/src/scheduler.rs
//
// Block driver for the Ecdysis daemon.
//
// Simulates block production at a configured interval. Before committing each
// height it runs the upgrade manager's consensus hook, and halts (leaving the
// height uncommitted) when an upgrade comes due.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use ecdysis_core::error::EcdysisError;
use ecdysis_core::traits::KeyValueStore;
use ecdysis_core::UpgradeOutcome;
use ecdysis_rpc::NodeStatus;
use ecdysis_upgrade::UpgradeManager;

use crate::chain::ChainState;

/// Why the block driver stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverExit {
    /// An upgrade came due; the node must be restarted on a new binary.
    Halted { name: String, epoch: u64, height: u64 },
    /// The operator asked the node to stop.
    Shutdown,
}

/// Drives the simulated chain and its upgrade hooks.
pub struct BlockDriver {
    manager: Arc<UpgradeManager<ChainState>>,
    chain: ChainState,
    blocks_per_epoch: u64,
    status: Arc<RwLock<NodeStatus>>,
}

impl BlockDriver {
    /// Create a driver resuming from the committed height in `store`.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        manager: Arc<UpgradeManager<ChainState>>,
        blocks_per_epoch: u64,
        status: Arc<RwLock<NodeStatus>>,
    ) -> Result<Self, EcdysisError> {
        let chain = ChainState::load(store)?;
        Ok(Self {
            manager,
            chain,
            blocks_per_epoch,
            status,
        })
    }

    /// Epoch containing `height`.
    pub fn epoch_at(&self, height: u64) -> u64 {
        height / self.blocks_per_epoch
    }

    pub fn committed_height(&self) -> u64 {
        self.chain.height()
    }

    /// Process the next height.
    ///
    /// The height is committed only when the upgrade hook lets consensus continue.
    pub async fn step(&mut self) -> Result<UpgradeOutcome, EcdysisError> {
        let height = self.chain.next_height();
        let epoch = self.epoch_at(height);

        let outcome = self.manager.consensus_upgrade(&mut self.chain, epoch, height)?;

        match &outcome {
            UpgradeOutcome::Continue => {
                self.chain.commit(height)?;
                if height % self.blocks_per_epoch == 0 {
                    tracing::info!("=== EPOCH {} BOUNDARY === (block {})", epoch, height);
                } else {
                    tracing::trace!(height, epoch, "committed block");
                }
                let mut status = self.status.write().await;
                status.height = height;
                status.epoch = epoch;
            }
            UpgradeOutcome::StopForUpgrade { name, height, .. } => {
                let mut status = self.status.write().await;
                status.state = "Halted".to_string();
                status.halted_for = Some(name.clone());
                status.halt_height = Some(*height);
            }
        }

        Ok(outcome)
    }

    /// Run the driver loop until an upgrade halts the node or Ctrl-C arrives.
    pub async fn run(&mut self, interval: Duration) -> Result<DriverExit, EcdysisError> {
        tracing::info!(
            "Block driver started (blocks_per_epoch={}, committed_height={})",
            self.blocks_per_epoch,
            self.chain.height()
        );

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Block driver received shutdown signal");
                    return Ok(DriverExit::Shutdown);
                }
                _ = tokio::time::sleep(interval) => {
                    if let UpgradeOutcome::StopForUpgrade { name, epoch, height } = self.step().await? {
                        return Ok(DriverExit::Halted { name, epoch, height });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ecdysis_core::{Descriptor, SoftwareVersion, UpgradeStage};
    use ecdysis_store::MemoryStore;
    use ecdysis_upgrade::{DummyHandler, MigrationRegistry, DUMMY_UPGRADE_NAME};

    const RUNNING: SoftwareVersion = SoftwareVersion::new(0, 1, 0);

    struct Fixture {
        kv: Arc<MemoryStore>,
        data_dir: std::path::PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                kv: Arc::new(MemoryStore::new()),
                data_dir: std::env::temp_dir()
                    .join(format!("ecdysis_driver_{}", uuid::Uuid::now_v7())),
            }
        }

        fn manager(&self) -> Arc<UpgradeManager<ChainState>> {
            let mut registry: MigrationRegistry<ChainState> = MigrationRegistry::new();
            registry
                .register(DUMMY_UPGRADE_NAME, Arc::new(DummyHandler))
                .unwrap();
            Arc::new(
                UpgradeManager::new(
                    self.kv.clone(),
                    self.data_dir.clone(),
                    RUNNING,
                    Arc::new(registry),
                )
                .unwrap(),
            )
        }

        fn driver(&self, manager: Arc<UpgradeManager<ChainState>>) -> BlockDriver {
            let status = Arc::new(RwLock::new(NodeStatus::default()));
            BlockDriver::new(self.kv.clone(), manager, 10, status).unwrap()
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.data_dir);
        }
    }

    #[tokio::test]
    async fn test_blocks_commit_without_upgrades() {
        let fx = Fixture::new();
        let mut driver = fx.driver(fx.manager());

        for _ in 0..25 {
            assert_eq!(driver.step().await.unwrap(), UpgradeOutcome::Continue);
        }
        assert_eq!(driver.committed_height(), 25);
        assert_eq!(driver.status.read().await.epoch, 2);
    }

    #[tokio::test]
    async fn test_halts_before_committing_upgrade_height() {
        let fx = Fixture::new();
        let manager = fx.manager();
        manager
            .submit_descriptor(Descriptor::new(DUMMY_UPGRADE_NAME, 2, RUNNING))
            .unwrap();
        let mut driver = fx.driver(manager.clone());

        let mut outcome = UpgradeOutcome::Continue;
        while outcome == UpgradeOutcome::Continue {
            outcome = driver.step().await.unwrap();
        }

        assert_eq!(
            outcome,
            UpgradeOutcome::StopForUpgrade {
                name: DUMMY_UPGRADE_NAME.to_string(),
                epoch: 2,
                height: 20,
            }
        );
        assert_eq!(driver.committed_height(), 19);
        let status = driver.status.read().await;
        assert_eq!(status.state, "Halted");
        assert_eq!(status.halted_for.as_deref(), Some(DUMMY_UPGRADE_NAME));
        assert_eq!(status.halt_height, Some(20));
        assert_eq!(status.height, 19);
    }

    #[tokio::test]
    async fn test_restart_completes_upgrade_at_same_height() {
        let fx = Fixture::new();
        {
            let manager = fx.manager();
            manager
                .submit_descriptor(Descriptor::new(DUMMY_UPGRADE_NAME, 1, RUNNING))
                .unwrap();
            let mut driver = fx.driver(manager.clone());
            while !driver.step().await.unwrap().is_stop() {}
            manager.close().unwrap();
        }

        // New binary: startup stage, then the halted height again.
        let manager = fx.manager();
        manager.startup_upgrade().unwrap();
        assert!(manager.pending_upgrades()[0].has_stage(UpgradeStage::Startup));

        let mut driver = fx.driver(manager.clone());
        assert_eq!(driver.committed_height(), 9);
        assert_eq!(driver.step().await.unwrap(), UpgradeOutcome::Continue);
        assert_eq!(driver.committed_height(), 10);
        assert!(manager.pending_upgrades().is_empty());
        assert!(DummyHandler::marker_path(&fx.data_dir, DUMMY_UPGRADE_NAME).exists());
    }

    #[tokio::test]
    async fn test_storage_failure_is_reported() {
        let fx = Fixture::new();
        let mut driver = fx.driver(fx.manager());
        fx.kv.set_fail_writes(true);

        assert!(matches!(driver.step().await, Err(EcdysisError::Storage(_))));
        assert_eq!(driver.committed_height(), 0);
    }
}
