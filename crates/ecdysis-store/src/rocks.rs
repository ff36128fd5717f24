// crates/ecdysis-store/src/rocks.rs
//
// RocksDB-backed persistent key-value storage.
//
// Keys are opaque bytes; callers namespace them through `ServiceStore`
// (e.g., `upgrade:descriptors`, `chain:height`).

use rocksdb::{DBWithThreadMode, MultiThreaded, Options};

use ecdysis_core::error::EcdysisError;
use ecdysis_core::traits::KeyValueStore;

/// RocksDB wrapper implementing the `KeyValueStore` trait.
#[derive(Debug)]
pub struct RocksStore {
    db: DBWithThreadMode<MultiThreaded>,
}

impl RocksStore {
    /// Open a RocksDB database at the given filesystem path.
    ///
    /// Creates the database directory (and its parents) if it does not exist.
    pub fn open(path: &str) -> Result<Self, EcdysisError> {
        std::fs::create_dir_all(path).map_err(|e| {
            EcdysisError::Storage(format!("Failed to create RocksDB directory {}: {}", path, e))
        })?;

        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DBWithThreadMode::<MultiThreaded>::open(&opts, path).map_err(|e| {
            EcdysisError::Storage(format!("Failed to open RocksDB at {}: {}", path, e))
        })?;

        Ok(Self { db })
    }

    /// Flush memtables to disk.
    pub fn flush(&self) -> Result<(), EcdysisError> {
        self.db
            .flush()
            .map_err(|e| EcdysisError::Storage(format!("RocksDB flush failed: {}", e)))
    }
}

impl KeyValueStore for RocksStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EcdysisError> {
        self.db
            .get(key)
            .map_err(|e| EcdysisError::Storage(format!("RocksDB get failed: {}", e)))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), EcdysisError> {
        self.db
            .put(key, value)
            .map_err(|e| EcdysisError::Storage(format!("RocksDB put failed: {}", e)))
    }

    fn delete(&self, key: &[u8]) -> Result<(), EcdysisError> {
        // RocksDB deletes are blind; probe first so absence is reported.
        if self.get(key)?.is_none() {
            return Err(EcdysisError::NotFound(
                String::from_utf8_lossy(key).into_owned(),
            ));
        }
        self.db
            .delete(key)
            .map_err(|e| EcdysisError::Storage(format!("RocksDB delete failed: {}", e)))
    }
}
