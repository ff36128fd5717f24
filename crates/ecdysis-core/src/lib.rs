// crates/ecdysis-core/src/lib.rs
//
// ecdysis-core: Core types, traits, and errors for the Ecdysis coordinated
// upgrade subsystem.
//
// This is the leaf crate that all other crates in the workspace depend on.
// It defines upgrade descriptors, pending upgrade records, software versions,
// the protocol-wide error type, and the trait seams between the upgrade
// manager, its persistent store, and the operator control surface.

pub mod error;
pub mod traits;
pub mod upgrade;
pub mod version;

// Re-export key types for ergonomic access from downstream crates.
// Usage: `use ecdysis_core::Descriptor;`

// Upgrade types
pub use upgrade::{Descriptor, PendingUpgrade, UpgradeOutcome, UpgradeStage, EPOCH_INVALID};

// Version types
pub use version::SoftwareVersion;

// Error type
pub use error::EcdysisError;

// Traits
pub use traits::{KeyValueStore, UpgradeBackend};
