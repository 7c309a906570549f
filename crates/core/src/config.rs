// crates/core/src/config.rs
//! Client configuration: executor location and the timing policy of the
//! event channel and controller.

use std::time::Duration;

use jobtrack_types::JobId;

use crate::error::ConfigError;
use crate::jobs::ControllerConfig;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Configuration for the executor client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// JOBTRACK_BASE_URL (e.g. http://127.0.0.1:8000). No trailing slash.
    pub base_url: String,
    /// Ceiling for start/cancel requests. Not applied to the event stream.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Delay before the channel reconnects after a drop, until the server
    /// sends its own `retry:` value.
    pub reconnect_delay: Duration,
    /// Backstop: force an error outcome after this long without any event.
    pub stream_idle_timeout: Duration,
    /// Backstop: force an error outcome if the stream has not delivered
    /// `done` this long after it opened. Keepalives do not extend it.
    pub stream_max_duration: Duration,
    /// How long a cancel waits for the executor before settling anyway.
    pub cancel_fallback: Duration,
    /// Buffered events per channel.
    pub channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(3),
            stream_idle_timeout: Duration::from_secs(60),
            stream_max_duration: Duration::from_secs(60 * 60),
            cancel_fallback: Duration::from_millis(800),
            channel_capacity: 256,
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with `JOBTRACK_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(url) = lookup("JOBTRACK_BASE_URL") {
            config = config.with_base_url(&url)?;
        }
        if let Some(secs) = parse_u64(&lookup, "JOBTRACK_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_u64(&lookup, "JOBTRACK_RECONNECT_MS")? {
            config.reconnect_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_u64(&lookup, "JOBTRACK_IDLE_TIMEOUT_SECS")? {
            config.stream_idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_u64(&lookup, "JOBTRACK_MAX_STREAM_SECS")? {
            config.stream_max_duration = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_u64(&lookup, "JOBTRACK_CANCEL_FALLBACK_MS")? {
            config.cancel_fallback = Duration::from_millis(ms);
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, url: &str) -> Result<Self, ConfigError> {
        let url = url.trim().trim_end_matches('/');
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(url.to_string()));
        }
        self.base_url = url.to_string();
        Ok(self)
    }

    pub fn start_url(&self) -> String {
        format!("{}/api/jobs/start/", self.base_url)
    }

    pub fn cancel_url(&self, job_id: &JobId) -> String {
        format!(
            "{}/api/jobs/cancel/{}/",
            self.base_url,
            urlencoding::encode(job_id.as_str())
        )
    }

    pub fn stream_url(&self, job_id: &JobId) -> String {
        format!(
            "{}/api/jobs/stream/{}/",
            self.base_url,
            urlencoding::encode(job_id.as_str())
        )
    }

    pub fn controller(&self) -> ControllerConfig {
        ControllerConfig {
            stream_idle_timeout: self.stream_idle_timeout,
            stream_max_duration: self.stream_max_duration,
            cancel_fallback: self.cancel_fallback,
        }
    }
}

fn parse_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value }),
    }
}
