// crates/types/src/lib.rs
//! Wire and domain types shared by every jobtrack crate.
//!
//! - `JobId` / `Status`: identity and lifecycle of a server-side job
//! - `JobEvent`: one decoded event from a job's event stream
//! - `Outcome`: the terminal result shown to the user, once per job
//! - `StartResponse` / `CancelResponse`: executor response bodies

pub mod api;
pub mod event;
pub mod job;
pub mod outcome;

pub use api::{CancelResponse, StartResponse};
pub use event::JobEvent;
pub use job::{JobId, Status, UnknownStatus};
pub use outcome::Outcome;
