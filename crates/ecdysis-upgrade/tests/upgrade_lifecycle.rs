// crates/ecdysis-upgrade/tests/upgrade_lifecycle.rs
//
// End-to-end upgrade lifecycle tests against a real RocksDB store.
//
// A "restart" drops the manager and the database handle and reopens both from
// the same path, exactly as a node process would after halting.

use std::sync::Arc;
use std::thread;

use uuid::Uuid;

use ecdysis_core::{Descriptor, EcdysisError, SoftwareVersion, UpgradeOutcome, UpgradeStage};
use ecdysis_store::RocksStore;
use ecdysis_upgrade::{
    DummyHandler, MigrationContext, MigrationHandler, MigrationRegistry, UpgradeManager,
    DUMMY_UPGRADE_NAME,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const RUNNING: SoftwareVersion = SoftwareVersion::new(0, 1, 0);

/// Stand-in for the consensus application state handed to consensus stages.
#[derive(Debug, Default)]
struct ChainState {
    migrated_at: Vec<(String, u64)>,
}

/// Handler for the "v2" upgrade: records where its consensus stage ran.
struct V2Handler;

impl MigrationHandler<ChainState> for V2Handler {
    fn startup_upgrade(&self, _ctx: &MigrationContext) -> Result<(), EcdysisError> {
        Ok(())
    }

    fn consensus_upgrade(&self, ctx: &MigrationContext, state: &mut ChainState) -> Result<(), EcdysisError> {
        let height = ctx.upgrade.upgrade_height.unwrap_or_default();
        state.migrated_at.push((ctx.name().to_string(), height));
        Ok(())
    }
}

struct Node {
    db_path: String,
    data_dir: std::path::PathBuf,
    registry: Arc<MigrationRegistry<ChainState>>,
}

impl Node {
    fn new(label: &str) -> Self {
        let root = std::env::temp_dir().join(format!("ecdysis_test_{}_{}", label, Uuid::now_v7()));
        let mut registry: MigrationRegistry<ChainState> = MigrationRegistry::new();
        registry.register("v2", Arc::new(V2Handler)).unwrap();
        registry
            .register(DUMMY_UPGRADE_NAME, Arc::new(DummyHandler))
            .unwrap();
        Self {
            db_path: root.join("db").to_string_lossy().to_string(),
            data_dir: root,
            registry: Arc::new(registry),
        }
    }

    /// Start (or restart) the node's upgrade manager.
    fn boot(&self) -> Result<UpgradeManager<ChainState>, EcdysisError> {
        let store = Arc::new(RocksStore::open(&self.db_path)?);
        UpgradeManager::new(store, self.data_dir.clone(), RUNNING, self.registry.clone())
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.data_dir);
    }
}

// ===========================================================================
// Tests
// ===========================================================================

/// Submit v2@100, run up to the epoch, halt, restart, and finish the upgrade.
#[test]
fn test_end_to_end_upgrade_across_restart() {
    let node = Node::new("e2e");
    let mut state = ChainState::default();

    let mgr = node.boot().unwrap();
    mgr.startup_upgrade().unwrap();
    mgr.submit_descriptor(Descriptor::new("v2", 100, RUNNING)).unwrap();

    // Epoch 99: nothing due.
    assert_eq!(
        mgr.consensus_upgrade(&mut state, 99, 50).unwrap(),
        UpgradeOutcome::Continue
    );
    assert_eq!(mgr.pending_upgrades()[0].upgrade_height, None);

    // Epoch 100: the upgrade comes due at height 51 and the node must halt.
    assert_eq!(
        mgr.consensus_upgrade(&mut state, 100, 51).unwrap(),
        UpgradeOutcome::StopForUpgrade {
            name: "v2".to_string(),
            epoch: 100,
            height: 51,
        }
    );
    assert_eq!(mgr.pending_upgrades()[0].upgrade_height, Some(51));
    mgr.close().unwrap();
    drop(mgr);

    // New binary boots.
    let mgr = node.boot().unwrap();
    mgr.startup_upgrade().unwrap();
    let pending = mgr.pending_upgrades();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].has_stage(UpgradeStage::Startup));
    assert!(!pending[0].is_completed());

    // Height 51 is processed again, this time running the consensus stage.
    assert_eq!(
        mgr.consensus_upgrade(&mut state, 100, 51).unwrap(),
        UpgradeOutcome::Continue
    );
    assert_eq!(state.migrated_at, vec![("v2".to_string(), 51)]);
    assert!(mgr.pending_upgrades().is_empty());

    // Consensus keeps going without further upgrade activity.
    assert_eq!(
        mgr.consensus_upgrade(&mut state, 100, 52).unwrap(),
        UpgradeOutcome::Continue
    );
    mgr.close().unwrap();
    drop(mgr);

    // Nothing is left on disk.
    let mgr = node.boot().unwrap();
    assert!(mgr.pending_upgrades().is_empty());
}

/// A node killed right after halting, restarted twice before consensus resumes,
/// runs the startup stage exactly once.
#[test]
fn test_dummy_upgrade_startup_marker_written_once() {
    let node = Node::new("dummy");
    let mut state = ChainState::default();

    let mgr = node.boot().unwrap();
    mgr.submit_descriptor(Descriptor::new(DUMMY_UPGRADE_NAME, 3, RUNNING))
        .unwrap();
    assert!(mgr.consensus_upgrade(&mut state, 3, 30).unwrap().is_stop());
    drop(mgr);

    let marker = DummyHandler::marker_path(&node.data_dir, DUMMY_UPGRADE_NAME);
    assert!(!marker.exists());

    let mgr = node.boot().unwrap();
    mgr.startup_upgrade().unwrap();
    assert_eq!(std::fs::read_to_string(&marker).unwrap(), "30");
    std::fs::remove_file(&marker).unwrap();
    drop(mgr);

    let mgr = node.boot().unwrap();
    mgr.startup_upgrade().unwrap();
    assert!(!marker.exists());

    assert_eq!(
        mgr.consensus_upgrade(&mut state, 3, 30).unwrap(),
        UpgradeOutcome::Continue
    );
    assert!(mgr.pending_upgrades().is_empty());
}

/// Restarting at a height past the recorded upgrade height (the consensus stage
/// already ran in the previous lifetime) completes the record without rerunning it.
#[test]
fn test_restart_past_upgrade_height_catches_up() {
    let node = Node::new("catch_up");
    let mut state = ChainState::default();

    let mgr = node.boot().unwrap();
    mgr.submit_descriptor(Descriptor::new("v2", 100, RUNNING)).unwrap();
    assert!(mgr.consensus_upgrade(&mut state, 100, 51).unwrap().is_stop());
    drop(mgr);

    let mgr = node.boot().unwrap();
    mgr.startup_upgrade().unwrap();
    assert_eq!(
        mgr.consensus_upgrade(&mut state, 100, 60).unwrap(),
        UpgradeOutcome::Continue
    );
    assert!(state.migrated_at.is_empty());
    assert!(mgr.pending_upgrades().is_empty());
}

/// Operator commands from many threads are serialized by the manager lock.
#[test]
fn test_concurrent_submissions_are_serialized() {
    let node = Node::new("concurrent");
    let mgr = Arc::new(node.boot().unwrap());

    let handles: Vec<_> = (0..8u64)
        .map(|i| {
            let mgr = mgr.clone();
            thread::spawn(move || {
                // Every thread races to submit the same shared descriptor plus its own.
                let shared = mgr.submit_descriptor(Descriptor::new("v2", 1_000, RUNNING));
                mgr.submit_descriptor(Descriptor::new("v2", 2_000 + i, RUNNING))
                    .unwrap();
                shared.is_ok()
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
    assert_eq!(mgr.pending_upgrades().len(), 9);

    mgr.close().unwrap();
    drop(mgr);

    let restarted = node.boot().unwrap();
    assert_eq!(restarted.pending_upgrades().len(), 9);
}
