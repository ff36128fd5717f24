// crates/ecdysis-upgrade/src/manager.rs
//
// UpgradeManager: orchestrates pending upgrades across restarts.
//
// The manager owns the list of pending upgrade records and mirrors it to the
// `upgrade:descriptors` key of the node's store after every mutation. Every
// public operation holds one exclusive lock for its full duration, so operator
// commands (submit/cancel/list) and the consensus driver's hooks never observe
// each other's intermediate state.
//
// Per-record progression driven by the consensus hook:
//   height unset, epoch not reached  -> untouched
//   height unset, epoch reached      -> record height, flush, StopForUpgrade
//   height set, current > height     -> mark Consensus (ran in a prior lifetime)
//   height set, current == height    -> run consensus stage, mark Consensus
//   height set, current < height     -> invariant violation (fatal)

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use ecdysis_core::error::EcdysisError;
use ecdysis_core::traits::{KeyValueStore, UpgradeBackend};
use ecdysis_core::upgrade::{Descriptor, PendingUpgrade, UpgradeOutcome, UpgradeStage};
use ecdysis_core::version::SoftwareVersion;
use ecdysis_store::ServiceStore;

use crate::migrations::{MigrationContext, MigrationRegistry};

/// Store namespace owned by the upgrade manager.
pub const MODULE_NAME: &str = "upgrade";

/// Key (within `MODULE_NAME`) holding the pending upgrade snapshot.
pub const DESCRIPTORS_KEY: &[u8] = b"descriptors";

/// Values of the `event` log field for upgrade milestones.
pub const LOG_EVENT_STARTUP_UPGRADE: &str = "upgrade.startup";
pub const LOG_EVENT_CONSENSUS_UPGRADE: &str = "upgrade.consensus";
pub const LOG_EVENT_INCOMPATIBLE_BINARY: &str = "upgrade.incompatible_binary";
pub const LOG_EVENT_STOP_FOR_UPGRADE: &str = "upgrade.stop_for_upgrade";
pub const LOG_EVENT_UPGRADE_COMPLETED: &str = "upgrade.completed";

/// State guarded by the manager lock.
#[derive(Debug)]
struct ManagerInner {
    /// `None` once the manager has been closed.
    store: Option<ServiceStore>,
    pending: Vec<PendingUpgrade>,
}

impl ManagerInner {
    fn store(&self) -> Result<&ServiceStore, EcdysisError> {
        self.store.as_ref().ok_or(EcdysisError::Closed)
    }

    /// Persist `candidate` minus its completed records and return what was kept.
    ///
    /// Leaves `self.pending` untouched so callers decide whether to commit.
    fn persist(&self, candidate: Vec<PendingUpgrade>) -> Result<Vec<PendingUpgrade>, EcdysisError> {
        let store = self.store()?;
        let (completed, retained): (Vec<_>, Vec<_>) =
            candidate.into_iter().partition(PendingUpgrade::is_completed);

        if retained.is_empty() {
            match store.delete(DESCRIPTORS_KEY) {
                Ok(()) | Err(EcdysisError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        } else {
            store.put_json(DESCRIPTORS_KEY, &retained)?;
        }

        for pu in &completed {
            tracing::info!(
                name = %pu.descriptor.name,
                event = LOG_EVENT_UPGRADE_COMPLETED,
                "upgrade completed, removing state"
            );
        }

        Ok(retained)
    }

    /// Persist the current list and drop completed records from memory.
    fn flush(&mut self) -> Result<(), EcdysisError> {
        let retained = self.persist(self.pending.clone())?;
        self.pending = retained;
        Ok(())
    }
}

/// Coordinates submitted upgrades from descriptor to completion.
///
/// `C` is the consensus driver's private context handed to consensus stages.
pub struct UpgradeManager<C> {
    inner: Mutex<ManagerInner>,
    registry: Arc<MigrationRegistry<C>>,
    data_dir: PathBuf,
    running_version: SoftwareVersion,
}

impl<C> std::fmt::Debug for UpgradeManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpgradeManager")
            .field("data_dir", &self.data_dir)
            .field("running_version", &self.running_version)
            .field("registry", &self.registry)
            .finish()
    }
}

impl<C> UpgradeManager<C> {
    /// Construct a manager and load any persisted pending upgrades.
    ///
    /// Fails if a due (height recorded, not completed) upgrade cannot be run
    /// by this binary: either the running version is incompatible or no
    /// migration handler is registered for it. Completed records found on
    /// disk are purged.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        data_dir: impl Into<PathBuf>,
        running_version: SoftwareVersion,
        registry: Arc<MigrationRegistry<C>>,
    ) -> Result<Self, EcdysisError> {
        let manager = Self {
            inner: Mutex::new(ManagerInner {
                store: Some(ServiceStore::new(store, MODULE_NAME)),
                pending: Vec::new(),
            }),
            registry,
            data_dir: data_dir.into(),
            running_version,
        };
        manager.check_status()?;
        Ok(manager)
    }

    /// Load the persisted snapshot and verify this binary can run due upgrades.
    fn check_status(&self) -> Result<(), EcdysisError> {
        let mut inner = self.inner.lock();

        let loaded = match inner.store()?.get_json::<Vec<PendingUpgrade>>(DESCRIPTORS_KEY) {
            Ok(pending) => pending,
            Err(EcdysisError::NotFound(_)) => {
                tracing::debug!("no pending descriptors, continuing startup");
                return Ok(());
            }
            Err(EcdysisError::Serialization(msg)) => {
                return Err(EcdysisError::Serialization(format!(
                    "can't decode stored upgrade descriptors: {}",
                    msg
                )));
            }
            Err(e) => return Err(e),
        };

        for pu in &loaded {
            pu.validate()?;

            if pu.is_completed() || pu.upgrade_height.is_none() {
                continue;
            }

            // The upgrade should proceed right now. Check that we have the right binary.
            if let Err(e) = pu.descriptor.ensure_compatible(&self.running_version) {
                tracing::error!(
                    name = %pu.descriptor.name,
                    err = %e,
                    event = LOG_EVENT_INCOMPATIBLE_BINARY,
                    "incompatible binary version for upgrade"
                );
                return Err(e);
            }

            if !self.registry.contains(&pu.descriptor.name) {
                let e = EcdysisError::HandlerNotFound(pu.descriptor.name.clone());
                tracing::error!(
                    name = %pu.descriptor.name,
                    err = %e,
                    "error getting migration handler for upgrade"
                );
                return Err(e);
            }
        }

        inner.pending = loaded;
        inner.flush()?;

        tracing::info!(pending = inner.pending.len(), "loaded pending upgrade metadata");
        Ok(())
    }

    /// Submit a descriptor for a new pending upgrade.
    pub fn submit_descriptor(&self, descriptor: Descriptor) -> Result<(), EcdysisError> {
        descriptor.validate_basic()?;

        let mut inner = self.inner.lock();
        if inner.pending.iter().any(|pu| pu.descriptor == descriptor) {
            return Err(EcdysisError::AlreadyPending);
        }

        let name = descriptor.name.clone();
        let epoch = descriptor.epoch;

        let mut candidate = inner.pending.clone();
        candidate.push(PendingUpgrade::new(descriptor, self.running_version));
        let retained = inner.persist(candidate)?;
        inner.pending = retained;

        tracing::info!(
            name = %name,
            epoch,
            "received upgrade descriptor, scheduling shutdown"
        );
        Ok(())
    }

    /// Snapshot of all pending upgrades.
    pub fn pending_upgrades(&self) -> Vec<PendingUpgrade> {
        self.inner.lock().pending.clone()
    }

    /// Cancel every pending upgrade equal to `descriptor`.
    ///
    /// Returns whether a record was removed. Fails with `UpgradeInProgress`
    /// (leaving state untouched) if a matching upgrade has already recorded
    /// its height or completed a stage.
    pub fn cancel_upgrade(&self, descriptor: &Descriptor) -> Result<bool, EcdysisError> {
        let mut inner = self.inner.lock();

        if inner.pending.is_empty() {
            // Make sure nothing is saved.
            inner.flush()?;
            return Ok(false);
        }

        let mut remaining = Vec::with_capacity(inner.pending.len());
        for pu in &inner.pending {
            if pu.descriptor != *descriptor {
                remaining.push(pu.clone());
                continue;
            }
            if pu.is_started() {
                return Err(EcdysisError::UpgradeInProgress);
            }
        }

        let cancelled = inner.pending.len() - remaining.len();
        let retained = inner.persist(remaining)?;
        inner.pending = retained;

        if cancelled > 0 {
            tracing::info!(
                name = %descriptor.name,
                epoch = descriptor.epoch,
                "cancelled pending upgrade"
            );
        }
        Ok(cancelled > 0)
    }

    /// Run the startup stage of every due upgrade that has not run it yet.
    ///
    /// Called once at process start, before the consensus driver processes
    /// any block. A missing handler or a failing stage is fatal to startup.
    pub fn startup_upgrade(&self) -> Result<(), EcdysisError> {
        let mut inner = self.inner.lock();
        inner.store()?;

        let mut working = inner.pending.clone();
        for pu in working.iter_mut() {
            if pu.upgrade_height.is_none() {
                continue;
            }
            if pu.has_stage(UpgradeStage::Startup) {
                tracing::warn!(
                    name = %pu.descriptor.name,
                    "startup upgrade already performed, skipping"
                );
                continue;
            }

            tracing::warn!(
                name = %pu.descriptor.name,
                event = LOG_EVENT_STARTUP_UPGRADE,
                "performing startup upgrade"
            );
            let handler = self.registry.get_handler(&pu.descriptor.name)?;
            let ctx = MigrationContext::new(pu, &self.data_dir);
            handler.startup_upgrade(&ctx)?;
            pu.push_stage(UpgradeStage::Startup);
        }

        let retained = inner.persist(working)?;
        inner.pending = retained;
        Ok(())
    }

    /// Per-block consensus hook.
    ///
    /// Returns `UpgradeOutcome::StopForUpgrade` the first time an upgrade's
    /// epoch is reached; the caller must halt without committing
    /// `current_height`. Returns an `InvariantViolation` error if a recorded
    /// upgrade height lies in the future, which the caller must treat as fatal.
    pub fn consensus_upgrade(
        &self,
        private: &mut C,
        current_epoch: u64,
        current_height: u64,
    ) -> Result<UpgradeOutcome, EcdysisError> {
        let mut inner = self.inner.lock();
        inner.store()?;

        for idx in 0..inner.pending.len() {
            let pu = &mut inner.pending[idx];

            match pu.upgrade_height {
                None => {
                    // Not due yet; startup made sure we're an appropriate binary for that.
                    if current_epoch < pu.descriptor.epoch {
                        continue;
                    }

                    pu.set_upgrade_height(current_height)?;
                    let outcome = UpgradeOutcome::StopForUpgrade {
                        name: pu.descriptor.name.clone(),
                        epoch: pu.descriptor.epoch,
                        height: current_height,
                    };

                    if let Err(e) = inner.flush() {
                        inner.pending[idx].upgrade_height = None;
                        return Err(e);
                    }

                    tracing::warn!(
                        epoch = current_epoch,
                        height = current_height,
                        event = LOG_EVENT_STOP_FOR_UPGRADE,
                        "upgrade epoch reached, stopping for upgrade"
                    );
                    return Ok(outcome);
                }
                Some(upgrade_height) if current_height > upgrade_height => {
                    // Past the upgrade height: the consensus stage ran in the
                    // lifetime that processed `upgrade_height`.
                    pu.push_stage(UpgradeStage::Consensus);
                }
                Some(upgrade_height) if current_height < upgrade_height => {
                    tracing::error!(
                        name = %pu.descriptor.name,
                        upgrade_height,
                        current_height,
                        "upgrade height is in the future but upgrade epoch seen already"
                    );
                    return Err(EcdysisError::InvariantViolation(format!(
                        "upgrade {} recorded height {} but consensus is at height {}",
                        pu.descriptor.name, upgrade_height, current_height
                    )));
                }
                Some(_) => {
                    if pu.has_stage(UpgradeStage::Consensus) {
                        continue;
                    }

                    tracing::warn!(
                        name = %pu.descriptor.name,
                        event = LOG_EVENT_CONSENSUS_UPGRADE,
                        "performing consensus upgrade"
                    );
                    let handler = self.registry.get_handler(&pu.descriptor.name)?;
                    let ctx = MigrationContext::new(pu, &self.data_dir);
                    handler.consensus_upgrade(&ctx, private)?;
                    pu.push_stage(UpgradeStage::Consensus);
                }
            }
        }

        // Markers pushed above stay in memory if this fails; the next call retries.
        inner.flush()?;
        Ok(UpgradeOutcome::Continue)
    }

    /// Flush pending state one last time and release the store.
    ///
    /// Calling `close` again is a no-op; every other operation fails with
    /// `EcdysisError::Closed` afterwards.
    pub fn close(&self) -> Result<(), EcdysisError> {
        let mut inner = self.inner.lock();
        if inner.store.is_none() {
            return Ok(());
        }
        let result = inner.flush();
        inner.store = None;
        if let Err(e) = &result {
            tracing::warn!(err = %e, "final upgrade state flush failed");
        }
        result
    }

    pub fn registry(&self) -> &MigrationRegistry<C> {
        &self.registry
    }
}

impl<C> UpgradeBackend for UpgradeManager<C> {
    fn submit_descriptor(&self, descriptor: Descriptor) -> Result<(), EcdysisError> {
        UpgradeManager::submit_descriptor(self, descriptor)
    }

    fn pending_upgrades(&self) -> Vec<PendingUpgrade> {
        UpgradeManager::pending_upgrades(self)
    }

    fn cancel_upgrade(&self, descriptor: &Descriptor) -> Result<bool, EcdysisError> {
        UpgradeManager::cancel_upgrade(self, descriptor)
    }
}
