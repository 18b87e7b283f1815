//! Response bodies of the read API.
//!
//! Project records are served as stored (`ProjectRecord`, camelCase):
//!
//! ```json
//! {
//!   "owner": "0x1111111111111111111111111111111111111111",
//!   "projectDetailsHash": "Qm...",
//!   "certificateHash": "Qm...",
//!   "isApproved": true,
//!   "isRevoked": false,
//!   "approvalHash": "Qm...",
//!   "lastPosition": { "block": 1042, "log_index": 3 }
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::model::ProjectRecord;
use crate::observability::{MetricsSnapshot, SyncStatus};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ApprovedProjectsResponse {
    pub count: usize,
    pub projects: Vec<ProjectRecord>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy` while following the live feed, `degraded` otherwise
    pub status: String,
    pub sync: SyncStatus,
    pub metrics: MetricsSnapshot,
    pub version: String,
}
