// crates/ecdysis-rpc/src/handlers/node.rs
//
// Node info and health handlers: GetNodeInfo, GetHealth.

use serde::{Deserialize, Serialize};

/// Live node status published by the daemon's block driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Lifecycle state name (e.g., "Running", "Halted").
    pub state: String,
    /// Last committed block height.
    pub height: u64,
    /// Epoch of the last committed block.
    pub epoch: u64,
    /// Name of the upgrade the node halted for, if any.
    pub halted_for: Option<String>,
    /// Height the node stopped at. It stays uncommitted until the new binary runs it.
    pub halt_height: Option<u64>,
}

impl Default for NodeStatus {
    fn default() -> Self {
        Self {
            state: "Initializing".to_string(),
            height: 0,
            epoch: 0,
            halted_for: None,
            halt_height: None,
        }
    }
}

// ---------------------------------------------------------------------------
// GetNodeInfo
// ---------------------------------------------------------------------------

/// Request for node information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetNodeInfoRequest {}

/// Response containing node information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetNodeInfoResponse {
    /// Version of the running binary.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
    /// Lifecycle state name.
    pub state: String,
    /// Last committed block height.
    pub height: u64,
    /// Epoch of the last committed block.
    pub epoch: u64,
    /// Names of the migration handlers this binary can run.
    pub handlers: Vec<String>,
}

/// Handle a GetNodeInfo request.
pub async fn handle_get_node_info(
    _request: GetNodeInfoRequest,
    version: String,
    uptime_seconds: u64,
    status: NodeStatus,
    handlers: Vec<String>,
) -> Result<GetNodeInfoResponse, String> {
    Ok(GetNodeInfoResponse {
        version,
        uptime_seconds,
        state: status.state,
        height: status.height,
        epoch: status.epoch,
        handlers,
    })
}

// ---------------------------------------------------------------------------
// GetHealth
// ---------------------------------------------------------------------------

/// Request for node health status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetHealthRequest {}

/// Response containing node health status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetHealthResponse {
    /// Overall health: "healthy" or "halted".
    pub status: String,
    /// Number of pending upgrades.
    pub pending_upgrades: usize,
    /// Human-readable details.
    pub details: Option<String>,
}

/// Handle a GetHealth request.
///
/// A node halted for an upgrade reports "halted" with the upgrade name.
pub async fn handle_get_health(
    _request: GetHealthRequest,
    status: NodeStatus,
    pending_upgrades: usize,
) -> Result<GetHealthResponse, String> {
    let (health, details) = match status.halted_for {
        Some(name) => {
            let details = match status.halt_height {
                Some(height) => format!("Halted for upgrade {} at height {}", name, height),
                None => format!("Halted for upgrade {}", name),
            };
            ("halted".to_string(), Some(details))
        }
        None if pending_upgrades > 0 => (
            "healthy".to_string(),
            Some(format!("{} upgrade(s) scheduled", pending_upgrades)),
        ),
        None => ("healthy".to_string(), None),
    };

    Ok(GetHealthResponse {
        status: health,
        pending_upgrades,
        details,
    })
}
