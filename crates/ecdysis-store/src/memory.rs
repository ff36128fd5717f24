// crates/ecdysis-store/src/memory.rs
//
// In-memory key-value store.
//
// Used by tests and by nodes that run without durable state. Writes can be
// switched to fail on demand so callers' rollback paths can be exercised.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use ecdysis_core::error::EcdysisError;
use ecdysis_core::traits::KeyValueStore;

/// BTreeMap-backed `KeyValueStore`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put`/`delete` fail with a storage error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn check_writable(&self) -> Result<(), EcdysisError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(EcdysisError::Storage(
                "in-memory store write failure (injected)".to_string(),
            ));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EcdysisError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), EcdysisError> {
        self.check_writable()?;
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), EcdysisError> {
        self.check_writable()?;
        match self.entries.write().remove(key) {
            Some(_) => Ok(()),
            None => Err(EcdysisError::NotFound(
                String::from_utf8_lossy(key).into_owned(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crud() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.put(b"k", b"v").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.len(), 1);

        store.delete(b"k").unwrap();
        assert!(matches!(store.delete(b"k"), Err(EcdysisError::NotFound(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_injected_write_failure() {
        let store = MemoryStore::new();
        store.put(b"k", b"v1").unwrap();

        store.set_fail_writes(true);
        assert!(matches!(store.put(b"k", b"v2"), Err(EcdysisError::Storage(_))));
        assert!(matches!(store.delete(b"k"), Err(EcdysisError::Storage(_))));
        // Reads still work and see the last successful write.
        assert_eq!(store.get(b"k").unwrap(), Some(b"v1".to_vec()));

        store.set_fail_writes(false);
        store.put(b"k", b"v2").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v2".to_vec()));
    }
}
