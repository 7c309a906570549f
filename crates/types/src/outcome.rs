// crates/types/src/outcome.rs
use serde::Serialize;

use crate::job::{JobId, Status};

/// Terminal result of one tracked job.
///
/// Emitted exactly once per job and never retracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    /// `None` when the job never got an id (start rejected, canceled early).
    pub job_id: Option<JobId>,
    pub ok: bool,
    pub status: Status,
    pub message: String,
    pub finished_at: String,
}

impl Outcome {
    pub fn new(job_id: Option<JobId>, status: Status, message: impl Into<String>) -> Self {
        Self {
            job_id,
            ok: status == Status::Success,
            status,
            message: message.into(),
            finished_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
