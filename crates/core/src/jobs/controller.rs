// crates/core/src/jobs/controller.rs
//! Controller that owns the one tracked job and its event channel.
//!
//! All state lives in a single task. Commands (`run`, `cancel`), executor
//! responses, channel events and timers are handled one at a time by one
//! `select!` loop, so there is exactly one writer for the job and the
//! channel slot.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use jobtrack_types::{JobEvent, JobId, Outcome, Status};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::projection::{self, CANCELED};
use super::state::{force_terminal, reduce, Job};
use crate::api::{HttpExecutor, JobExecutor};
use crate::channel::{ChannelConnector, ChannelEvent, EventChannel, SseConnector};
use crate::config::ClientConfig;
use crate::error::{ApiError, ControllerError};

pub const CANCEL_REQUESTED: &str = "Cancellation requested...";
pub const SUPERSEDED: &str = "Superseded by a new job.";

/// Timing policy of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Force an error outcome after this long without any channel event.
    pub stream_idle_timeout: Duration,
    /// Force an error outcome if no terminal event arrives this long after
    /// the channel opened, however lively the channel is.
    pub stream_max_duration: Duration,
    /// Settle a cancel after this long even if the executor never answers.
    pub cancel_fallback: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            stream_idle_timeout: Duration::from_secs(60),
            stream_max_duration: Duration::from_secs(60 * 60),
            cancel_fallback: Duration::from_millis(800),
        }
    }
}

/// Controller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No request in flight, no channel open.
    Idle,
    /// Start request in flight.
    Starting,
    /// Channel open, events flowing into the job.
    Streaming,
    /// Job ended locally; waiting to emit the outcome (pending cancel).
    Finalizing,
}

/// Everything a UI needs to render the current job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Bumped on every `run`.
    pub generation: u64,
    pub phase: Phase,
    pub job: Option<Job>,
    /// Outcome of the current generation, once emitted.
    pub outcome: Option<Outcome>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            generation: 0,
            phase: Phase::Idle,
            job: None,
            outcome: None,
        }
    }
}

enum Command {
    Run(serde_json::Value),
    Cancel,
}

/// Completions of requests spawned by the controller, tagged with the
/// generation that issued them.
enum TaskResult {
    Started {
        generation: u64,
        result: Result<JobId, ApiError>,
        /// Keeps the tracker busy until any orphan cancel has been spawned.
        token: TaskTrackerToken,
    },
    CancelAcked {
        generation: u64,
        result: Result<(), ApiError>,
    },
}

/// Handle to a running controller. Cheap to clone.
///
/// The controller task stops once every handle is dropped.
#[derive(Clone)]
pub struct JobController {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<Snapshot>,
    outcomes: broadcast::Sender<Outcome>,
    /// Start and cancel requests in flight.
    tasks: TaskTracker,
}

impl JobController {
    /// Spawn the controller task on the current runtime.
    pub fn spawn<E, C>(executor: Arc<E>, connector: C, config: ControllerConfig) -> Self
    where
        E: JobExecutor,
        C: ChannelConnector,
    {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::default());
        let (outcome_tx, _) = broadcast::channel(16);
        let tasks = TaskTracker::new();

        let task = ControllerTask {
            executor,
            connector,
            config,
            commands: commands_rx,
            results_tx,
            results_rx,
            snapshot_tx,
            outcome_tx: outcome_tx.clone(),
            tasks: tasks.clone(),
            generation: 0,
            phase: Phase::Idle,
            job: None,
            outcome: None,
            channel: None,
            idle_deadline: None,
            stream_deadline: None,
            cancel_deadline: None,
            canceled_starts: HashSet::new(),
        };
        tokio::spawn(task.run());

        Self {
            commands: commands_tx,
            snapshots: snapshot_rx,
            outcomes: outcome_tx,
            tasks,
        }
    }

    /// Controller over HTTP, sharing one client between requests and
    /// event streams.
    pub fn connect(config: &ClientConfig) -> Result<Self, ApiError> {
        let executor = HttpExecutor::new(config.clone())?;
        let connector = SseConnector::new(executor.client().clone(), config.clone());
        Ok(Self::spawn(Arc::new(executor), connector, config.controller()))
    }

    /// Start a new job, superseding the current one if any.
    pub fn run(&self, payload: serde_json::Value) -> Result<(), ControllerError> {
        self.commands
            .send(Command::Run(payload))
            .map_err(|_| ControllerError::Stopped)
    }

    /// Cancel the current job. The local state becomes `canceled` on the
    /// controller's next turn, whatever the executor answers.
    pub fn cancel(&self) -> Result<(), ControllerError> {
        self.commands
            .send(Command::Cancel)
            .map_err(|_| ControllerError::Stopped)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Terminal outcomes, one per job. Subscribe before `run` to see them all.
    pub fn outcomes(&self) -> broadcast::Receiver<Outcome> {
        self.outcomes.subscribe()
    }

    /// Wait up to `grace` for start and cancel requests still in flight,
    /// including best-effort cancels of orphaned and superseded jobs.
    /// Call before dropping the runtime. Returns `false` if some were
    /// abandoned.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tasks.close();
        let drained = tokio::time::timeout(grace, self.tasks.wait()).await.is_ok();
        if !drained {
            warn!(pending = self.tasks.len(), "Abandoning requests still in flight");
        }
        drained
    }
}

struct ControllerTask<E, C> {
    executor: Arc<E>,
    connector: C,
    config: ControllerConfig,
    commands: mpsc::UnboundedReceiver<Command>,
    results_tx: mpsc::UnboundedSender<TaskResult>,
    results_rx: mpsc::UnboundedReceiver<TaskResult>,
    snapshot_tx: watch::Sender<Snapshot>,
    outcome_tx: broadcast::Sender<Outcome>,
    tasks: TaskTracker,

    generation: u64,
    phase: Phase,
    job: Option<Job>,
    outcome: Option<Outcome>,
    /// The single live channel slot. Always emptied before refilled.
    channel: Option<EventChannel>,
    idle_deadline: Option<Instant>,
    /// Absolute ceiling for the current stream, set once when it opens.
    stream_deadline: Option<Instant>,
    cancel_deadline: Option<Instant>,
    /// Generations canceled while their start request was in flight.
    canceled_starts: HashSet<u64>,
}

impl<E, C> ControllerTask<E, C>
where
    E: JobExecutor,
    C: ChannelConnector,
{
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Run(payload)) => self.handle_run(payload),
                    Some(Command::Cancel) => self.handle_cancel(),
                    None => break,
                },
                Some(result) = self.results_rx.recv() => match result {
                    TaskResult::Started { generation, result, token: _token } => {
                        self.handle_started(generation, result)
                    }
                    TaskResult::CancelAcked { generation, result } => {
                        self.handle_cancel_acked(generation, result)
                    }
                },
                event = next_event(&mut self.channel) => self.handle_channel_event(event),
                () = sleep_until(self.idle_deadline) => self.handle_idle_timeout(),
                () = sleep_until(self.stream_deadline) => self.handle_stream_ceiling(),
                () = sleep_until(self.cancel_deadline) => self.handle_cancel_fallback(),
            }
            self.publish();
        }
        self.close_channel();
        debug!("Job controller stopped");
    }

    fn handle_run(&mut self, payload: serde_json::Value) {
        // Close-then-replace: nothing from the old stream can reach the new job.
        self.close_channel();
        self.clear_stream_deadlines();
        self.settle_superseded();

        self.generation += 1;
        let generation = self.generation;
        self.phase = Phase::Starting;
        self.job = Some(Job::new());
        self.outcome = None;
        info!(generation, "Submitting job");

        let executor = Arc::clone(&self.executor);
        let results = self.results_tx.clone();
        let tasks = self.tasks.clone();
        self.tasks.spawn(async move {
            let result = executor.start(payload).await;
            let token = tasks.token();
            let _ = results.send(TaskResult::Started {
                generation,
                result,
                token,
            });
        });
    }

    /// Give the job being replaced its one outcome.
    fn settle_superseded(&mut self) {
        match self.phase {
            Phase::Idle => {}
            Phase::Starting => {
                self.canceled_starts.insert(self.generation);
                self.end_job_locally(Status::Canceled, SUPERSEDED);
                self.emit_outcome(Outcome::new(None, Status::Canceled, SUPERSEDED));
            }
            Phase::Streaming => {
                self.end_job_locally(Status::Canceled, SUPERSEDED);
                let job_id = self.current_job_id();
                if let Some(job_id) = job_id.clone() {
                    self.spawn_detached_cancel(job_id);
                }
                self.emit_outcome(Outcome::new(job_id, Status::Canceled, SUPERSEDED));
            }
            Phase::Finalizing => {
                self.cancel_deadline = None;
                let job_id = self.current_job_id();
                self.emit_outcome(Outcome::new(job_id, Status::Canceled, CANCELED));
            }
        }
        self.phase = Phase::Idle;
    }

    fn handle_started(&mut self, generation: u64, result: Result<JobId, ApiError>) {
        if generation != self.generation || self.phase != Phase::Starting {
            let was_canceled = self.canceled_starts.remove(&generation);
            match result {
                Ok(job_id) if was_canceled => {
                    info!(
                        job_id = %job_id,
                        generation,
                        "Job started after it was canceled; canceling orphan"
                    );
                    self.spawn_detached_cancel(job_id);
                }
                Ok(job_id) => debug!(job_id = %job_id, generation, "Ignoring stale start result"),
                Err(e) => debug!(generation, error = %e, "Ignoring stale start failure"),
            }
            return;
        }

        match result {
            Err(e) => {
                let message = e.to_string();
                warn!(generation, error = %message, "Job submission failed");
                if let Some(job) = self.job.take() {
                    self.job = Some(force_terminal(job, Status::Error, "", Some(message.clone())));
                }
                self.phase = Phase::Idle;
                self.emit_outcome(Outcome::new(None, Status::Error, message));
            }
            Ok(job_id) => {
                info!(job_id = %job_id, generation, "Opening event channel");
                if let Some(job) = self.job.as_mut() {
                    job.id = Some(job_id.clone());
                }
                self.close_channel();
                self.channel = Some(self.connector.open(&job_id));
                self.phase = Phase::Streaming;
                self.stream_deadline = Some(Instant::now() + self.config.stream_max_duration);
                self.touch();
            }
        }
    }

    fn handle_channel_event(&mut self, event: Option<ChannelEvent>) {
        if self.phase != Phase::Streaming {
            debug!(phase = ?self.phase, "Ignoring channel event outside streaming");
            return;
        }

        match event {
            None => {
                // Reader gone without a done; only the backstop can end this now.
                self.close_channel();
                self.apply(&JobEvent::ConnectionError {
                    reason: "event channel ended".to_string(),
                });
            }
            Some(ChannelEvent::Keepalive) => self.touch(),
            Some(ChannelEvent::Job(event)) => {
                if !matches!(event, JobEvent::ConnectionError { .. }) {
                    self.touch();
                }
                self.apply(&event);
            }
        }

        if self.job.as_ref().is_some_and(|job| job.terminal) {
            self.finalize();
        }
    }

    fn handle_cancel(&mut self) {
        match self.phase {
            Phase::Idle => {
                if self.outcome.is_some() {
                    debug!(generation = self.generation, "Nothing to cancel");
                    return;
                }
                info!("Cancel requested before any job");
                self.emit_outcome(Outcome::new(None, Status::Canceled, CANCELED));
            }
            Phase::Starting => {
                info!(generation = self.generation, "Cancel requested while submitting");
                self.canceled_starts.insert(self.generation);
                self.end_job_locally(Status::Canceled, CANCELED);
                self.phase = Phase::Idle;
                self.emit_outcome(Outcome::new(None, Status::Canceled, CANCELED));
            }
            Phase::Streaming => {
                self.close_channel();
                self.clear_stream_deadlines();
                self.end_job_locally(Status::Canceled, CANCEL_REQUESTED);
                self.phase = Phase::Finalizing;

                let Some(job_id) = self.current_job_id() else {
                    self.phase = Phase::Idle;
                    self.emit_outcome(Outcome::new(None, Status::Canceled, CANCELED));
                    return;
                };
                info!(job_id = %job_id, "Cancel requested while streaming");
                self.cancel_deadline = Some(Instant::now() + self.config.cancel_fallback);

                let generation = self.generation;
                let executor = Arc::clone(&self.executor);
                let results = self.results_tx.clone();
                self.tasks.spawn(async move {
                    let result = executor.cancel(&job_id).await;
                    let _ = results.send(TaskResult::CancelAcked { generation, result });
                });
            }
            Phase::Finalizing => debug!("Cancel already in progress"),
        }
    }

    fn handle_cancel_acked(&mut self, generation: u64, result: Result<(), ApiError>) {
        if generation != self.generation || self.cancel_deadline.is_none() {
            debug!(generation, "Ignoring late cancel response");
            return;
        }
        self.cancel_deadline = None;
        let message = match result {
            Ok(()) => CANCELED.to_string(),
            Err(e) => {
                warn!(generation, error = %e, "Cancel request failed");
                format!("Cancel request failed: {e}")
            }
        };
        self.phase = Phase::Idle;
        let job_id = self.current_job_id();
        self.emit_outcome(Outcome::new(job_id, Status::Canceled, message));
    }

    fn handle_cancel_fallback(&mut self) {
        if self.cancel_deadline.take().is_none() {
            return;
        }
        warn!(
            generation = self.generation,
            fallback_ms = self.config.cancel_fallback.as_millis() as u64,
            "Cancel request still unanswered; settling locally"
        );
        self.phase = Phase::Idle;
        let job_id = self.current_job_id();
        self.emit_outcome(Outcome::new(job_id, Status::Canceled, CANCELED));
    }

    fn handle_idle_timeout(&mut self) {
        if self.idle_deadline.take().is_none() || self.phase != Phase::Streaming {
            return;
        }
        let idle = self.config.stream_idle_timeout;
        self.give_up(format!("No event received for {idle:?}"));
    }

    fn handle_stream_ceiling(&mut self) {
        if self.stream_deadline.take().is_none() || self.phase != Phase::Streaming {
            return;
        }
        let max = self.config.stream_max_duration;
        self.give_up(format!("No terminal event within {max:?}"));
    }

    /// Backstop: end a stream that never delivered `done` with an error.
    fn give_up(&mut self, reason: String) {
        let mut error = reason;
        if let Some(previous) = self.job.as_ref().and_then(|job| job.error.as_deref()) {
            error = format!("{error} (last error: {previous})");
        }
        warn!(job_id = ?self.current_job_id(), error = %error, "Giving up on event stream");

        self.close_channel();
        if let Some(job) = self.job.take() {
            let message = job.message.clone();
            self.job = Some(force_terminal(job, Status::Error, message, Some(error)));
        }
        self.finalize();
    }

    fn finalize(&mut self) {
        self.phase = Phase::Finalizing;
        self.close_channel();
        self.clear_stream_deadlines();
        if let Some(job) = &self.job {
            let outcome = projection::outcome(job);
            self.emit_outcome(outcome);
        }
        self.phase = Phase::Idle;
    }

    fn apply(&mut self, event: &JobEvent) {
        if let Some(job) = self.job.take() {
            self.job = Some(reduce(job, event));
        }
    }

    fn end_job_locally(&mut self, status: Status, message: &str) {
        if let Some(job) = self.job.take() {
            self.job = Some(force_terminal(job, status, message, None));
        }
    }

    /// Emit the current generation's outcome unless it already was.
    fn emit_outcome(&mut self, outcome: Outcome) {
        if self.outcome.is_some() {
            debug!(generation = self.generation, "Outcome already emitted");
            return;
        }
        info!(
            job_id = ?outcome.job_id,
            status = %outcome.status,
            ok = outcome.ok,
            message = %outcome.message,
            "Job finished"
        );
        // No subscribers is fine.
        let _ = self.outcome_tx.send(outcome.clone());
        self.outcome = Some(outcome);
    }

    fn spawn_detached_cancel(&self, job_id: JobId) {
        let executor = Arc::clone(&self.executor);
        self.tasks.spawn(async move {
            if let Err(e) = executor.cancel(&job_id).await {
                warn!(job_id = %job_id, error = %e, "Best-effort cancel failed");
            }
        });
    }

    fn close_channel(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
    }

    fn clear_stream_deadlines(&mut self) {
        self.idle_deadline = None;
        self.stream_deadline = None;
    }

    fn touch(&mut self) {
        self.idle_deadline = Some(Instant::now() + self.config.stream_idle_timeout);
    }

    fn current_job_id(&self) -> Option<JobId> {
        self.job.as_ref().and_then(|job| job.id.clone())
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(Snapshot {
            generation: self.generation,
            phase: self.phase,
            job: self.job.clone(),
            outcome: self.outcome.clone(),
        });
    }
}

async fn next_event(slot: &mut Option<EventChannel>) -> Option<ChannelEvent> {
    match slot {
        Some(channel) => channel.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
