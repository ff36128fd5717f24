// crates/ecdysis-upgrade/src/lib.rs
//
// ecdysis-upgrade: Coordinated binary upgrades for an Ecdysis node.
//
// After an upgrade descriptor is submitted, the old binary keeps running (and
// may be restarted) until consensus reaches the descriptor's epoch. At that
// point the node records the height and halts; the new binary then runs the
// migration handler's startup stage on boot and its consensus stage at the
// recorded height, after which the upgrade is complete and forgotten.

pub mod dummy;
pub mod manager;
pub mod migrations;

// Re-export key types for ergonomic access from downstream crates.
pub use dummy::{DummyHandler, DUMMY_UPGRADE_NAME};
pub use manager::{UpgradeManager, DESCRIPTORS_KEY, MODULE_NAME};
pub use migrations::{MigrationContext, MigrationHandler, MigrationRegistry};
