// crates/ecdysis-daemon/src/chain.rs
//
// Simulated chain state: the consensus driver's private context.
//
// Only the last committed height is persisted (`chain:height`). Migration
// consensus stages receive `&mut ChainState` at the upgrade height, before
// that height is committed.

use std::sync::Arc;

use ecdysis_core::error::EcdysisError;
use ecdysis_core::traits::KeyValueStore;
use ecdysis_store::ServiceStore;

pub const CHAIN_NAMESPACE: &str = "chain";
pub const HEIGHT_KEY: &[u8] = b"height";

/// Committed chain state of the local node.
#[derive(Debug)]
pub struct ChainState {
    store: ServiceStore,
    height: u64,
}

impl ChainState {
    /// Load the last committed height, starting from genesis (0) if none.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Result<Self, EcdysisError> {
        let store = ServiceStore::new(store, CHAIN_NAMESPACE);
        let height = match store.get_json::<u64>(HEIGHT_KEY) {
            Ok(h) => h,
            Err(EcdysisError::NotFound(_)) => 0,
            Err(e) => return Err(e),
        };
        Ok(Self { store, height })
    }

    /// Last committed block height.
    pub fn height(&self) -> u64 {
        self.height
    }

    /// Height the driver will process next.
    pub fn next_height(&self) -> u64 {
        self.height + 1
    }

    /// Durably commit `height`, which must directly follow the committed tip.
    pub fn commit(&mut self, height: u64) -> Result<(), EcdysisError> {
        if height != self.next_height() {
            return Err(EcdysisError::InvariantViolation(format!(
                "commit of height {} does not follow committed height {}",
                height, self.height
            )));
        }
        self.store.put_json(HEIGHT_KEY, &height)?;
        self.height = height;
        Ok(())
    }
}
