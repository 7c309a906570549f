// crates/core/src/channel/stream.rs
//! SSE channel over HTTP.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use jobtrack_types::{JobEvent, JobId};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::decode::decode_frame;
use super::sse::SseDecoder;
use super::{ChannelConnector, ChannelEvent, EventChannel};
use crate::config::ClientConfig;

/// Opens `GET /api/jobs/stream/{id}/` connections.
///
/// Each channel keeps reconnecting after a drop, reporting every drop as a
/// `connectionError`, until it sees `done` or is closed. Giving up is the
/// controller's decision.
#[derive(Clone)]
pub struct SseConnector {
    client: reqwest::Client,
    config: Arc<ClientConfig>,
}

impl SseConnector {
    pub fn new(client: reqwest::Client, config: ClientConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }
}

impl ChannelConnector for SseConnector {
    fn open(&self, job_id: &JobId) -> EventChannel {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let shutdown = CancellationToken::new();
        let reader = tokio::spawn(read_stream(
            self.client.clone(),
            self.config.stream_url(job_id),
            self.config.reconnect_delay,
            job_id.clone(),
            tx,
            shutdown.clone(),
        ));
        EventChannel::new(job_id.clone(), rx).with_reader(shutdown, reader)
    }
}

/// Why one connection attempt ended.
enum StreamEnd {
    /// `done` delivered; nothing more to read.
    Finished,
    /// Channel handle closed or dropped.
    ReceiverGone,
    Dropped(String),
}

async fn read_stream(
    client: reqwest::Client,
    url: String,
    mut retry: Duration,
    job_id: JobId,
    tx: mpsc::Sender<ChannelEvent>,
    shutdown: CancellationToken,
) {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let end = tokio::select! {
            _ = shutdown.cancelled() => return,
            end = connect_once(&client, &url, &job_id, &tx, &mut retry) => end,
        };

        let reason = match end {
            StreamEnd::Finished | StreamEnd::ReceiverGone => return,
            StreamEnd::Dropped(reason) => reason,
        };
        warn!(
            job_id = %job_id,
            attempt,
            retry_ms = retry.as_millis() as u64,
            reason = %reason,
            "Event stream dropped"
        );
        let event = ChannelEvent::Job(JobEvent::ConnectionError { reason });
        if tx.send(event).await.is_err() {
            return;
        }

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(retry) => {}
        }
    }
}

async fn connect_once(
    client: &reqwest::Client,
    url: &str,
    job_id: &JobId,
    tx: &mpsc::Sender<ChannelEvent>,
    retry: &mut Duration,
) -> StreamEnd {
    let response = match client
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => return StreamEnd::Dropped(format!("connect failed: {e}")),
    };

    let status = response.status();
    if !status.is_success() {
        return StreamEnd::Dropped(format!("HTTP {}", status.as_u16()));
    }
    info!(job_id = %job_id, "Event stream connected");

    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => return StreamEnd::Dropped(format!("read failed: {e}")),
        };
        let frames = decoder.feed(&chunk);
        if let Some(delay) = decoder.take_retry() {
            *retry = delay;
        }
        for frame in frames {
            match decode_frame(&frame) {
                Ok(Some(event)) => {
                    let done = matches!(&event, ChannelEvent::Job(e) if e.is_done());
                    if tx.send(event).await.is_err() {
                        return StreamEnd::ReceiverGone;
                    }
                    if done {
                        return StreamEnd::Finished;
                    }
                }
                Ok(None) => {
                    debug!(job_id = %job_id, event = ?frame.event, "Ignoring untracked event type");
                }
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "Dropping malformed event");
                }
            }
        }
        if let Some(e) = decoder.overflow() {
            return StreamEnd::Dropped(e.to_string());
        }
    }
    StreamEnd::Dropped("stream closed by server".to_string())
}
