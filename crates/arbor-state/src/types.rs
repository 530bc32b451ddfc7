//! Records persisted by the store that are not part of the engine's
//! vocabulary.

use arbor_core::{WorkloadSpec, WorkloadStatus};
use serde::{Deserialize, Serialize};

/// Stored workload: last applied spec plus its observed status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRecord {
    pub spec: WorkloadSpec,
    pub status: WorkloadStatus,
    /// Bumped on every in-place restart; pods carrying an older generation
    /// are replaced.
    pub restart_generation: u64,
    /// Unix timestamp (seconds) of the last restart.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restarted_at: Option<u64>,
}
