// crates/core/src/lib.rs
//! Client-side tracking of one server-executed job at a time.
//!
//! - `api`: start/cancel requests against the executor
//! - `channel`: the per-job event stream (SSE) with explicit teardown
//! - `jobs`: the pure job reducer, the controller that drives it, and the
//!   read-only projection shown to users

pub mod api;
pub mod channel;
pub mod config;
pub mod error;
pub mod jobs;

pub use api::{HttpExecutor, JobExecutor};
pub use channel::{ChannelConnector, ChannelEvent, EventChannel, SseConnector};
pub use config::ClientConfig;
pub use error::{ApiError, ConfigError, ControllerError, ProtocolError};
pub use jobs::{reduce, ControllerConfig, Job, JobController, Phase, Snapshot};
pub use jobtrack_types::{JobEvent, JobId, Outcome, Status};
