// crates/core/src/jobs/projection.rs
//! Read-only text derived from a `Job`.

use jobtrack_types::{Outcome, Status};

use super::state::Job;

pub const COMPLETED: &str = "Completed.";
pub const CANCELED: &str = "Canceled.";
pub const EXECUTION_FAILED: &str = "Execution failed.";

/// The outcome of a finished job.
pub fn outcome(job: &Job) -> Outcome {
    let message = match job.status {
        Status::Success => non_empty(&job.message).unwrap_or(COMPLETED).to_string(),
        Status::Canceled => CANCELED.to_string(),
        _ => match &job.error {
            Some(error) => format!("Failed: {error}"),
            None => non_empty(&job.message).unwrap_or(EXECUTION_FAILED).to_string(),
        },
    };
    Outcome::new(job.id.clone(), job.status, message)
}

/// One-line headline for a live view, e.g. `running: Gerando relatório`.
pub fn status_line(job: &Job) -> String {
    match non_empty(&job.message) {
        Some(message) => format!("{}: {}", job.status, message),
        None => job.status.to_string(),
    }
}

/// Log lines not yet shown, given how many already were.
pub fn unseen_logs(job: &Job, shown: usize) -> &[String] {
    job.log_lines.get(shown..).unwrap_or(&[])
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}
