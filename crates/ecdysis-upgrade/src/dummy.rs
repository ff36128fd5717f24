// crates/ecdysis-upgrade/src/dummy.rs
//
// Dummy migration handler for end-to-end upgrade exercises.
//
// The startup stage drops a marker file into the data directory so tooling can
// verify that the new binary ran it; the consensus stage only logs.

use std::fs;
use std::path::{Path, PathBuf};

use ecdysis_core::error::EcdysisError;

use crate::migrations::{MigrationContext, MigrationHandler};

/// Upgrade name under which the dummy handler is registered.
pub const DUMMY_UPGRADE_NAME: &str = "__e2e-test-valid";

/// Handler that performs no state changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyHandler;

impl DummyHandler {
    /// Path of the marker file written by the startup stage.
    pub fn marker_path(data_dir: &Path, name: &str) -> PathBuf {
        data_dir.join(format!("upgrade-{}.startup", name))
    }
}

impl<C> MigrationHandler<C> for DummyHandler {
    fn startup_upgrade(&self, ctx: &MigrationContext) -> Result<(), EcdysisError> {
        let marker = Self::marker_path(&ctx.data_dir, ctx.name());
        fs::create_dir_all(&ctx.data_dir).map_err(|e| {
            EcdysisError::Migration(format!(
                "dummy upgrade: cannot create {}: {}",
                ctx.data_dir.display(),
                e
            ))
        })?;
        let height = ctx.upgrade.upgrade_height.unwrap_or_default();
        fs::write(&marker, height.to_string()).map_err(|e| {
            EcdysisError::Migration(format!(
                "dummy upgrade: cannot write {}: {}",
                marker.display(),
                e
            ))
        })?;
        tracing::info!(name = %ctx.name(), marker = %marker.display(), "dummy upgrade: startup stage");
        Ok(())
    }

    fn consensus_upgrade(&self, ctx: &MigrationContext, _private: &mut C) -> Result<(), EcdysisError> {
        tracing::info!(
            name = %ctx.name(),
            height = ctx.upgrade.upgrade_height.unwrap_or_default(),
            "dummy upgrade: consensus stage"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecdysis_core::{Descriptor, PendingUpgrade, SoftwareVersion};

    #[test]
    fn test_startup_writes_marker() {
        let data_dir = std::env::temp_dir().join(format!("ecdysis_dummy_{}", uuid::Uuid::now_v7()));
        let mut pu = PendingUpgrade::new(
            Descriptor::new(DUMMY_UPGRADE_NAME, 3, SoftwareVersion::new(0, 1, 0)),
            SoftwareVersion::new(0, 1, 0),
        );
        pu.set_upgrade_height(31).unwrap();
        let ctx = MigrationContext::new(&pu, &data_dir);

        MigrationHandler::<()>::startup_upgrade(&DummyHandler, &ctx).unwrap();

        let marker = DummyHandler::marker_path(&data_dir, DUMMY_UPGRADE_NAME);
        assert_eq!(fs::read_to_string(&marker).unwrap(), "31");

        MigrationHandler::<()>::consensus_upgrade(&DummyHandler, &ctx, &mut ()).unwrap();

        let _ = fs::remove_dir_all(&data_dir);
    }
}
