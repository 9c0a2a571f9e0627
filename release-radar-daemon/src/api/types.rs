//! API response types for the daemon JSON-RPC interface.

use release_radar_core::{RunReport, SlotStatus};
use serde::{Deserialize, Serialize};

/// Response to `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Whether a sync run is in progress
    pub running: bool,
    /// Service credential slot
    pub service: SlotStatus,
    /// User credential slot
    pub user: SlotStatus,
    /// Report of the most recent completed run
    pub last_run: Option<RunReport>,
}
