// crates/types/src/event.rs
//! Events delivered by a job's event stream.

use serde::Serialize;

/// One decoded event from a job channel.
///
/// `status` fields carry the raw string sent by the executor; validation
/// against [`crate::Status`] happens when the event is applied, so an
/// unknown value can be dropped without losing the rest of the event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum JobEvent {
    /// Handshake sent on every (re)connect.
    Hello {
        status: Option<String>,
        message: Option<String>,
    },
    Status {
        status: Option<String>,
        message: Option<String>,
        error: Option<String>,
    },
    Log {
        line: String,
    },
    /// Explicit end of the job.
    Done {
        status: Option<String>,
    },
    /// Transport trouble reported by the channel itself, not by the job.
    ConnectionError {
        reason: String,
    },
}

impl JobEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            JobEvent::Hello { .. } => "hello",
            JobEvent::Status { .. } => "status",
            JobEvent::Log { .. } => "log",
            JobEvent::Done { .. } => "done",
            JobEvent::ConnectionError { .. } => "connectionError",
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, JobEvent::Done { .. })
    }
}
