// crates/core/src/jobs/mod.rs
//! Job tracking.
//!
//! Provides:
//! - `Job` / `reduce`: the pure state machine driven by channel events
//! - `JobController`: runs, cancels and supersedes the one tracked job
//! - `projection`: outcome and status text derived from a `Job`

pub mod controller;
pub mod projection;
pub mod state;

pub use controller::{ControllerConfig, JobController, Phase, Snapshot};
pub use state::{force_terminal, reduce, Job};
