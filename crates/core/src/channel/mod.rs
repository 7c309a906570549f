// crates/core/src/channel/mod.rs
//! Per-job event channel.
//!
//! Provides:
//! - `EventChannel`: owned handle to one job's event stream
//! - `ChannelConnector`: opens channels; `SseConnector` is the HTTP one
//! - `SseDecoder` / `decode_frame`: wire decoding

pub mod decode;
pub mod sse;
pub mod stream;

use jobtrack_types::{JobEvent, JobId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use decode::decode_frame;
pub use sse::{SseDecoder, SseFrame};
pub use stream::SseConnector;

/// What a channel delivers to its subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Job(JobEvent),
    /// Server keepalive. Proves the stream is alive, carries no job data.
    Keepalive,
}

/// Opens event channels for jobs.
pub trait ChannelConnector: Send + Sync + 'static {
    /// Start listening to `job_id`'s events. Must not block: connecting
    /// happens in the background and failures arrive as `connectionError`.
    fn open(&self, job_id: &JobId) -> EventChannel;
}

/// Handle to one job's event stream.
///
/// Owns the background reader (if any). Closing is idempotent and
/// synchronous: after `close` returns, `recv` yields nothing more, even
/// events that were already buffered. Dropping the handle closes it.
pub struct EventChannel {
    job_id: JobId,
    rx: mpsc::Receiver<ChannelEvent>,
    shutdown: CancellationToken,
    reader: Option<JoinHandle<()>>,
    closed: bool,
}

impl EventChannel {
    pub fn new(job_id: JobId, rx: mpsc::Receiver<ChannelEvent>) -> Self {
        Self {
            job_id,
            rx,
            shutdown: CancellationToken::new(),
            reader: None,
            closed: false,
        }
    }

    /// Attach the task that feeds this channel so `close` can stop it.
    pub fn with_reader(mut self, shutdown: CancellationToken, reader: JoinHandle<()>) -> Self {
        self.shutdown = shutdown;
        self.reader = Some(reader);
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Next event in arrival order. `None` once closed or once the reader
    /// has finished. Cancel-safe.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        if self.closed {
            return None;
        }
        self.rx.recv().await
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.shutdown.cancel();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.rx.close();
        tracing::debug!(job_id = %self.job_id, "Event channel closed");
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        self.close();
    }
}
