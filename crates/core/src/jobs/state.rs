// crates/core/src/jobs/state.rs
//! Pure state machine for a single tracked job.

use jobtrack_types::{JobEvent, JobId, Status};
use serde::Serialize;

/// Client-side view of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Assigned by the executor once the start request succeeds.
    pub id: Option<JobId>,
    pub status: Status,
    pub message: String,
    /// Append-only, in arrival order.
    pub log_lines: Vec<String>,
    pub error: Option<String>,
    /// Set once; after that the job never changes through events.
    pub terminal: bool,
}

impl Job {
    pub fn new() -> Self {
        Self {
            id: None,
            status: Status::Queued,
            message: String::new(),
            log_lines: Vec::new(),
            error: None,
            terminal: false,
        }
    }

    pub fn with_id(id: JobId) -> Self {
        Self {
            id: Some(id),
            ..Self::new()
        }
    }
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply one event.
///
/// Rules, first match wins:
/// 1. terminal jobs ignore everything
/// 2. `hello`/`status` adopt a known status, replace the message, and
///    (`status` only) record an error
/// 3. `log` appends
/// 4. `done` ends the job; a missing or non-terminal status resolves to the
///    current status if that is terminal, else `error`
/// 5. `connectionError` records an error once and never ends the job
pub fn reduce(mut job: Job, event: &JobEvent) -> Job {
    if job.terminal {
        tracing::debug!(job_id = ?job.id, event = event.kind(), "Ignoring event for finished job");
        return job;
    }

    match event {
        JobEvent::Hello { status, message } => {
            adopt_status(&mut job, status.as_deref());
            if let Some(message) = message {
                job.message = message.clone();
            }
        }
        JobEvent::Status {
            status,
            message,
            error,
        } => {
            adopt_status(&mut job, status.as_deref());
            if let Some(message) = message {
                job.message = message.clone();
            }
            if let Some(error) = error {
                job.error = Some(error.clone());
            }
        }
        JobEvent::Log { line } => job.log_lines.push(line.clone()),
        JobEvent::Done { status } => {
            let announced = status
                .as_deref()
                .and_then(|s| s.parse::<Status>().ok())
                .filter(|s| s.is_terminal());
            job.status = match announced {
                Some(status) => status,
                None if job.status.is_terminal() => job.status,
                None => {
                    tracing::warn!(
                        job_id = ?job.id,
                        announced = ?status,
                        "done without a terminal status; treating as failure"
                    );
                    Status::Error
                }
            };
            job.terminal = true;
        }
        JobEvent::ConnectionError { reason } => {
            if job.error.is_none() {
                job.error = Some(format!("Event stream connection failed: {reason}"));
            }
        }
    }
    job
}

/// End a job locally (cancellation, backstop timeout, failed start).
/// A job that is already terminal is returned unchanged.
pub fn force_terminal(
    mut job: Job,
    status: Status,
    message: impl Into<String>,
    error: Option<String>,
) -> Job {
    if job.terminal {
        return job;
    }
    job.status = status;
    job.message = message.into();
    if error.is_some() {
        job.error = error;
    }
    job.terminal = true;
    job
}

fn adopt_status(job: &mut Job, status: Option<&str>) {
    let Some(raw) = status else { return };
    match raw.parse::<Status>() {
        Ok(status) => job.status = status,
        Err(e) => tracing::warn!(job_id = ?job.id, error = %e, "Dropping unknown status"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn hello(status: &str) -> JobEvent {
        JobEvent::Hello {
            status: Some(status.to_string()),
            message: None,
        }
    }

    fn status(status: Option<&str>, message: Option<&str>) -> JobEvent {
        JobEvent::Status {
            status: status.map(str::to_string),
            message: message.map(str::to_string),
            error: None,
        }
    }

    fn log(line: &str) -> JobEvent {
        JobEvent::Log {
            line: line.to_string(),
        }
    }

    fn done(status: Option<&str>) -> JobEvent {
        JobEvent::Done {
            status: status.map(str::to_string),
        }
    }

    fn conn_error() -> JobEvent {
        JobEvent::ConnectionError {
            reason: "connection reset".to_string(),
        }
    }

    fn run(events: &[JobEvent]) -> Job {
        events.iter().fold(Job::with_id(JobId::from("j")), reduce)
    }

    #[test]
    fn test_successful_sequence() {
        let job = run(&[
            hello("queued"),
            status(Some("running"), Some("step 1")),
            log("line A"),
            log("line B"),
            done(Some("success")),
        ]);
        assert_eq!(job.status, Status::Success);
        assert_eq!(job.log_lines, vec!["line A", "line B"]);
        assert_eq!(job.message, "step 1");
        assert!(job.terminal);
    }

    #[test]
    fn test_done_without_status_defaults_to_error() {
        let job = run(&[status(Some("running"), None), conn_error(), done(None)]);
        assert_eq!(job.status, Status::Error);
        assert!(job.terminal);
        assert_eq!(
            job.error.as_deref(),
            Some("Event stream connection failed: connection reset")
        );
    }

    #[test]
    fn test_done_keeps_prior_terminal_status() {
        let job = run(&[status(Some("success"), Some("Relatórios gerados")), done(None)]);
        assert_eq!(job.status, Status::Success);

        // A non-terminal status on done is not informative either.
        let job = run(&[status(Some("canceled"), None), done(Some("running"))]);
        assert_eq!(job.status, Status::Canceled);
    }

    #[test]
    fn test_terminal_job_ignores_events() {
        let finished = run(&[status(Some("running"), Some("final")), done(Some("error"))]);
        let after = [
            log("late"),
            status(Some("success"), Some("changed")),
            done(Some("success")),
            conn_error(),
        ]
        .iter()
        .fold(finished.clone(), reduce);
        assert_eq!(after, finished);
    }

    #[test]
    fn test_unknown_status_dropped_message_kept() {
        let job = run(&[
            status(Some("running"), None),
            status(Some("paused"), Some("waiting on SAP")),
        ]);
        assert_eq!(job.status, Status::Running);
        assert_eq!(job.message, "waiting on SAP");
    }

    #[test]
    fn test_log_never_changes_status() {
        let job = run(&[hello("running"), log("queued"), log("success")]);
        assert_eq!(job.status, Status::Running);
        assert!(!job.terminal);
    }

    #[test]
    fn test_connection_error_keeps_first_error() {
        let job = run(&[
            JobEvent::Status {
                status: None,
                message: None,
                error: Some("disk full".to_string()),
            },
            conn_error(),
        ]);
        assert_eq!(job.error.as_deref(), Some("disk full"));
        assert!(!job.terminal);
    }

    #[test]
    fn test_transport_noise_does_not_flip_success() {
        let job = run(&[
            status(Some("running"), None),
            conn_error(),
            hello("running"),
            status(Some("success"), Some("ok")),
            done(Some("success")),
        ]);
        assert_eq!(job.status, Status::Success);
    }

    #[test]
    fn test_force_terminal() {
        let job = force_terminal(Job::new(), Status::Canceled, "Canceled.", None);
        assert_eq!(job.status, Status::Canceled);
        assert!(job.terminal);
        assert_eq!(job.error, None);

        let again = force_terminal(job.clone(), Status::Error, "late", Some("x".into()));
        assert_eq!(again, job);
    }

    fn any_status() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(None),
            prop::sample::select(vec!["queued", "running", "success", "error", "canceled", "bogus"])
                .prop_map(|s| Some(s.to_string())),
        ]
    }

    fn any_event() -> impl Strategy<Value = JobEvent> {
        prop_oneof![
            (any_status(), prop::option::of("[a-z ]{0,8}"))
                .prop_map(|(status, message)| JobEvent::Hello { status, message }),
            (any_status(), prop::option::of("[a-z ]{0,8}"), prop::option::of("[a-z]{1,5}"))
                .prop_map(|(status, message, error)| JobEvent::Status { status, message, error }),
            "[a-z0-9]{1,6}".prop_map(|line| JobEvent::Log { line }),
            any_status().prop_map(|status| JobEvent::Done { status }),
            Just(JobEvent::ConnectionError { reason: "eof".to_string() }),
        ]
    }

    proptest! {
        #[test]
        fn prop_terminal_state_is_frozen(events in prop::collection::vec(any_event(), 0..40)) {
            let mut job = Job::new();
            let mut frozen: Option<Job> = None;
            for event in &events {
                job = reduce(job, event);
                if let Some(snapshot) = &frozen {
                    prop_assert_eq!(&job, snapshot);
                } else if job.terminal {
                    frozen = Some(job.clone());
                }
            }
            if job.terminal {
                prop_assert!(job.status.is_terminal());
            }
        }

        #[test]
        fn prop_logs_appended_in_order(events in prop::collection::vec(any_event(), 0..40)) {
            let job = events.iter().fold(Job::new(), reduce);
            let expected: Vec<String> = events
                .iter()
                .scan(false, |ended, event| {
                    let seen = if *ended { None } else { Some(event) };
                    if event.is_done() {
                        *ended = true;
                    }
                    Some(seen)
                })
                .flatten()
                .filter_map(|event| match event {
                    JobEvent::Log { line } => Some(line.clone()),
                    _ => None,
                })
                .collect();
            prop_assert_eq!(job.log_lines, expected);
        }
    }
}
