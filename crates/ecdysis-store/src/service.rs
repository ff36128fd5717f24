// crates/ecdysis-store/src/service.rs
//
// ServiceStore: a namespaced, typed view over a shared key-value store.
//
// Several subsystems share one database; each gets a ServiceStore whose keys
// are prefixed with the subsystem's namespace:
//
//   - `{namespace}:{key}` -> JSON-encoded value
//
// JSON is self-describing, and serde emits struct fields in declaration
// order, so a given value always encodes to the same bytes.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use ecdysis_core::error::EcdysisError;
use ecdysis_core::traits::KeyValueStore;

/// Namespaced view over a shared `KeyValueStore`.
#[derive(Clone)]
pub struct ServiceStore {
    inner: Arc<dyn KeyValueStore>,
    namespace: String,
}

impl fmt::Debug for ServiceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceStore")
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl ServiceStore {
    /// Create a view of `inner` restricted to the given namespace.
    pub fn new(inner: Arc<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        Self {
            inner,
            namespace: namespace.into(),
        }
    }

    /// Build the namespaced key: `{namespace}:{key}`.
    fn full_key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(self.namespace.len() + 1 + key.len());
        full.extend_from_slice(self.namespace.as_bytes());
        full.push(b':');
        full.extend_from_slice(key);
        full
    }

    /// Fetch and decode the value under `key`.
    ///
    /// Returns `EcdysisError::NotFound` when the key is absent, so callers can
    /// tell "nothing stored" apart from a corrupt value.
    pub fn get_json<T: DeserializeOwned>(&self, key: &[u8]) -> Result<T, EcdysisError> {
        match self.inner.get(&self.full_key(key))? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Err(EcdysisError::NotFound(format!(
                "{}:{}",
                self.namespace,
                String::from_utf8_lossy(key)
            ))),
        }
    }

    /// Encode `value` and store it under `key`.
    pub fn put_json<T: Serialize + ?Sized>(&self, key: &[u8], value: &T) -> Result<(), EcdysisError> {
        let bytes = serde_json::to_vec(value)?;
        self.inner.put(&self.full_key(key), &bytes)
    }

    /// Delete `key`. Returns `EcdysisError::NotFound` if it was absent.
    pub fn delete(&self, key: &[u8]) -> Result<(), EcdysisError> {
        self.inner.delete(&self.full_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[test]
    fn test_namespaces_are_isolated() {
        let shared: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let upgrade = ServiceStore::new(shared.clone(), "upgrade");
        let chain = ServiceStore::new(shared.clone(), "chain");

        upgrade.put_json(b"descriptors", &vec![1u64, 2, 3]).unwrap();
        chain.put_json(b"descriptors", &42u64).unwrap();

        assert_eq!(upgrade.get_json::<Vec<u64>>(b"descriptors").unwrap(), vec![1, 2, 3]);
        assert_eq!(chain.get_json::<u64>(b"descriptors").unwrap(), 42);
        assert_eq!(
            shared.get(b"upgrade:descriptors").unwrap(),
            Some(b"[1,2,3]".to_vec())
        );
    }

    #[test]
    fn test_missing_key_is_not_found() {
        let store = ServiceStore::new(Arc::new(MemoryStore::new()), "upgrade");
        match store.get_json::<Vec<u64>>(b"descriptors") {
            Err(EcdysisError::NotFound(key)) => assert_eq!(key, "upgrade:descriptors"),
            other => panic!("Expected NotFound, got: {:?}", other),
        }
        assert!(matches!(store.delete(b"descriptors"), Err(EcdysisError::NotFound(_))));
    }

    #[test]
    fn test_corrupt_value_is_serialization_error() {
        let shared = Arc::new(MemoryStore::new());
        shared.put(b"upgrade:descriptors", b"{not json").unwrap();
        let store = ServiceStore::new(shared, "upgrade");
        assert!(matches!(
            store.get_json::<Vec<u64>>(b"descriptors"),
            Err(EcdysisError::Serialization(_))
        ));
    }
}
