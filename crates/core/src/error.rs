// crates/core/src/error.rs
use thiserror::Error;

/// Errors from the executor's start and cancel endpoints.
///
/// `Display` is the human-readable text shown as the job outcome, so the
/// variants that carry a server message print it verbatim.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response. `message` is the server's `error` field when it
    /// sent one, otherwise `HTTP <status>`.
    #[error("{message}")]
    Http { status: u16, message: String },

    /// Body was not the JSON the executor promises, whatever the status.
    #[error("Invalid server response (HTTP {status})")]
    InvalidResponse { status: u16 },

    /// 2xx response that still refused the request (`ok: false`, no job id).
    #[error("{0}")]
    Rejected(String),
}

impl ApiError {
    pub fn http(status: u16, error: Option<String>) -> Self {
        let message = error
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| format!("HTTP {status}"));
        Self::Http { status, message }
    }
}

/// A channel frame that could not be turned into a job event.
///
/// Always recovered locally: the frame is dropped and logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed {event} payload: {message}")]
    MalformedPayload { event: String, message: String },

    #[error("{event} payload is not a JSON object")]
    NotAnObject { event: String },

    #[error("empty log line")]
    EmptyLog,

    /// Unlike the frame errors above, this one ends the connection.
    #[error("event line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
}

/// Invalid client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("base URL must start with http:// or https://, got {0:?}")]
    InvalidBaseUrl(String),
}

/// Errors returned by [`crate::JobController`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("job controller has stopped")]
    Stopped,
}
