// crates/ecdysis-rpc/src/handlers/upgrade.rs
//
// Upgrade control handlers: SubmitDescriptor, PendingUpgrades, CancelUpgrade.
//
// These are thin adapters over the node's UpgradeBackend. Backend errors are
// rendered to strings for the JSON-RPC envelope.

use serde::{Deserialize, Serialize};

use ecdysis_core::traits::UpgradeBackend;
use ecdysis_core::{Descriptor, EcdysisError, PendingUpgrade};

/// Render a backend error for the response envelope.
///
/// Conflicts are routine operator mistakes; anything else is logged as a warning.
fn rejection(method: &str, e: EcdysisError) -> String {
    if e.is_conflict() {
        tracing::info!(method, error = %e, "Upgrade request rejected");
    } else {
        tracing::warn!(method, error = %e, "Upgrade request failed");
    }
    e.to_string()
}

// ---------------------------------------------------------------------------
// SubmitDescriptor
// ---------------------------------------------------------------------------

/// Request to schedule a new upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitDescriptorRequest {
    pub descriptor: Descriptor,
}

/// Response to a successful descriptor submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitDescriptorResponse {
    /// Name of the accepted upgrade.
    pub name: String,
    /// Epoch at which it takes effect.
    pub epoch: u64,
    /// Number of pending upgrades after the submission.
    pub pending_count: usize,
}

/// Handle a SubmitDescriptor request.
pub async fn handle_submit_descriptor(
    backend: &dyn UpgradeBackend,
    request: SubmitDescriptorRequest,
) -> Result<SubmitDescriptorResponse, String> {
    let name = request.descriptor.name.clone();
    let epoch = request.descriptor.epoch;

    backend
        .submit_descriptor(request.descriptor)
        .map_err(|e| rejection("upgrade/submit", e))?;

    tracing::info!(name = %name, epoch, "Upgrade descriptor submitted via RPC");

    Ok(SubmitDescriptorResponse {
        name,
        epoch,
        pending_count: backend.pending_upgrades().len(),
    })
}

// ---------------------------------------------------------------------------
// PendingUpgrades
// ---------------------------------------------------------------------------

/// Request for the list of pending upgrades.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingUpgradesRequest {}

/// Response containing every pending upgrade record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingUpgradesResponse {
    pub upgrades: Vec<PendingUpgrade>,
    pub count: usize,
}

/// Handle a PendingUpgrades request.
pub async fn handle_pending_upgrades(
    backend: &dyn UpgradeBackend,
    _request: PendingUpgradesRequest,
) -> Result<PendingUpgradesResponse, String> {
    let upgrades = backend.pending_upgrades();
    let count = upgrades.len();
    Ok(PendingUpgradesResponse { upgrades, count })
}

// ---------------------------------------------------------------------------
// CancelUpgrade
// ---------------------------------------------------------------------------

/// Request to cancel a pending upgrade that has not started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelUpgradeRequest {
    pub descriptor: Descriptor,
}

/// Response to a cancel request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelUpgradeResponse {
    /// Whether a matching pending upgrade was removed.
    pub cancelled: bool,
    /// Number of pending upgrades after the cancellation.
    pub pending_count: usize,
}

/// Handle a CancelUpgrade request.
///
/// Cancelling a descriptor that is not pending succeeds with `cancelled: false`.
pub async fn handle_cancel_upgrade(
    backend: &dyn UpgradeBackend,
    request: CancelUpgradeRequest,
) -> Result<CancelUpgradeResponse, String> {
    let cancelled = backend
        .cancel_upgrade(&request.descriptor)
        .map_err(|e| rejection("upgrade/cancel", e))?;

    Ok(CancelUpgradeResponse {
        cancelled,
        pending_count: backend.pending_upgrades().len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ecdysis_core::SoftwareVersion;
    use ecdysis_store::MemoryStore;
    use ecdysis_upgrade::{MigrationRegistry, UpgradeManager};

    const RUNNING: SoftwareVersion = SoftwareVersion::new(1, 0, 0);

    fn backend() -> UpgradeManager<()> {
        let registry: MigrationRegistry<()> = MigrationRegistry::new();
        UpgradeManager::new(
            Arc::new(MemoryStore::new()),
            std::env::temp_dir(),
            RUNNING,
            Arc::new(registry),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_submit_then_list() {
        let mgr = backend();
        let resp = handle_submit_descriptor(
            &mgr,
            SubmitDescriptorRequest {
                descriptor: Descriptor::new("v2", 100, RUNNING),
            },
        )
        .await
        .unwrap();
        assert_eq!(resp.name, "v2");
        assert_eq!(resp.pending_count, 1);

        let list = handle_pending_upgrades(&mgr, PendingUpgradesRequest::default())
            .await
            .unwrap();
        assert_eq!(list.count, 1);
        assert_eq!(list.upgrades[0].descriptor.epoch, 100);
    }

    #[tokio::test]
    async fn test_duplicate_submit_reports_error() {
        let mgr = backend();
        let req = SubmitDescriptorRequest {
            descriptor: Descriptor::new("v2", 100, RUNNING),
        };
        handle_submit_descriptor(&mgr, req.clone()).await.unwrap();
        let err = handle_submit_descriptor(&mgr, req).await.unwrap_err();
        assert!(err.contains("already pending"), "unexpected error: {}", err);
    }

    #[tokio::test]
    async fn test_cancel_reports_whether_anything_was_removed() {
        let mgr = backend();
        let descriptor = Descriptor::new("v2", 100, RUNNING);
        mgr.submit_descriptor(descriptor.clone()).unwrap();

        let resp = handle_cancel_upgrade(
            &mgr,
            CancelUpgradeRequest {
                descriptor: descriptor.clone(),
            },
        )
        .await
        .unwrap();
        assert!(resp.cancelled);
        assert_eq!(resp.pending_count, 0);

        let again = handle_cancel_upgrade(&mgr, CancelUpgradeRequest { descriptor })
            .await
            .unwrap();
        assert!(!again.cancelled);
    }

    #[tokio::test]
    async fn test_cancel_of_started_upgrade_is_rejected() {
        let mgr = backend();
        let descriptor = Descriptor::new("v2", 5, RUNNING);
        mgr.submit_descriptor(descriptor.clone()).unwrap();
        assert!(mgr.consensus_upgrade(&mut (), 5, 51).unwrap().is_stop());

        let err = handle_cancel_upgrade(&mgr, CancelUpgradeRequest { descriptor })
            .await
            .unwrap_err();
        assert_eq!(err, EcdysisError::UpgradeInProgress.to_string());
        assert_eq!(mgr.pending_upgrades()[0].upgrade_height, Some(51));
    }
}
