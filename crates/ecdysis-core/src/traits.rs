// crates/ecdysis-core/src/traits.rs

use crate::error::EcdysisError;
use crate::upgrade::{Descriptor, PendingUpgrade};

/// Trait for the durable key-value engine underneath the descriptor store.
///
/// Implemented by ecdysis-store (RocksDB and in-memory backends). All
/// operations are synchronous and expected to complete or fail promptly.
pub trait KeyValueStore: Send + Sync {
    /// Retrieve the value stored under `key`, or `None` if absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EcdysisError>;

    /// Store `value` under `key`, overwriting any previous value.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), EcdysisError>;

    /// Delete `key`. Returns `EcdysisError::NotFound` if the key is absent.
    fn delete(&self, key: &[u8]) -> Result<(), EcdysisError>;
}

/// Operator-facing control surface of the upgrade subsystem.
///
/// Implemented by ecdysis-upgrade's `UpgradeManager`; consumed by the RPC layer.
pub trait UpgradeBackend: Send + Sync {
    /// Submit a descriptor for a new pending upgrade.
    fn submit_descriptor(&self, descriptor: Descriptor) -> Result<(), EcdysisError>;

    /// Snapshot of all pending upgrades.
    fn pending_upgrades(&self) -> Vec<PendingUpgrade>;

    /// Cancel a pending upgrade that has not started yet.
    ///
    /// Returns whether a matching record was removed.
    fn cancel_upgrade(&self, descriptor: &Descriptor) -> Result<bool, EcdysisError>;
}
