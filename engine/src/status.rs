//! Sync status read by the UI.

use crate::{DrainReport, Timestamp};
use serde::{Deserialize, Serialize};

/// Process-wide sync state for one app session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Mirror of the connectivity monitor
    pub is_online: bool,
    /// A drain is in progress
    pub is_syncing: bool,
    /// Length of the mutation log
    pub pending_count: usize,
    /// When the last drain finished
    pub last_sync_at: Option<Timestamp>,
    /// Counts of the last drain
    pub last_report: Option<DrainReport>,
}

impl SyncStatus {
    /// Whether there is local work the remote store has not seen yet.
    pub fn has_pending(&self) -> bool {
        self.pending_count > 0
    }
}
