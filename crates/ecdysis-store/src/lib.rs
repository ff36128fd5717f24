// crates/ecdysis-store/src/lib.rs
//
// ecdysis-store: Storage layer for the Ecdysis upgrade subsystem.
//
// Provides a RocksDB-backed key-value store for durable node state, an
// in-memory store for tests and ephemeral nodes, and a namespaced service
// store that gives each subsystem its own key prefix and JSON encoding.

pub mod memory;
pub mod rocks;
pub mod service;

// Re-export key types for ergonomic access from downstream crates.
pub use memory::MemoryStore;
pub use rocks::RocksStore;
pub use service::ServiceStore;
