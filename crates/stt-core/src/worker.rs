//! Background statistics worker.
//!
//! Requests are sent to a channel and answered by spawned jobs. Only the
//! newest request matters: submitting a request cancels the job for the
//! previous one, and results from superseded requests are dropped.
//!
//! # Design
//!
//! - Each request gets a generation number; the worker remembers the latest
//! - In-flight jobs live in a `JoinSet` and get a child cancellation token
//! - The latest outcome is published on a `watch` channel, failures included
//! - Cancelling the worker token aborts everything; dropping every handle
//!   lets the pending job finish first

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::filter::RecordsFilter;
use crate::range::RangeLength;
use crate::service::{EngineError, StatisticsService};
use crate::statistics::StatisticsEntry;
use crate::store::RecordStore;
use crate::window::Window;

/// Default channel capacity for queued requests
const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// One statistics query: what range, which records, and as of when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticsRequest {
    pub range: RangeLength,
    pub shift: i32,
    pub filters: Vec<RecordsFilter>,
    pub include_untracked: bool,
    /// Instant the range is resolved against.
    pub requested_at: DateTime<Utc>,
}

impl StatisticsRequest {
    pub const fn new(range: RangeLength, requested_at: DateTime<Utc>) -> Self {
        Self {
            range,
            shift: 0,
            filters: Vec::new(),
            include_untracked: false,
            requested_at,
        }
    }

    #[must_use]
    pub const fn with_shift(mut self, shift: i32) -> Self {
        self.shift = shift;
        self
    }

    #[must_use]
    pub fn with_filters(mut self, filters: Vec<RecordsFilter>) -> Self {
        self.filters = filters;
        self
    }

    #[must_use]
    pub const fn with_untracked(mut self, include: bool) -> Self {
        self.include_untracked = include;
        self
    }
}

/// Result of the most recent request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatisticsReport {
    pub generation: u64,
    pub window: Window,
    pub entries: Vec<StatisticsEntry>,
    pub requested_at: DateTime<Utc>,
}

/// What the worker last published.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StatisticsState {
    /// No request has completed yet.
    #[default]
    Idle,
    Ready(Arc<StatisticsReport>),
    Failed { generation: u64, message: String },
}

impl StatisticsState {
    pub fn generation(&self) -> Option<u64> {
        match self {
            Self::Idle => None,
            Self::Ready(report) => Some(report.generation),
            Self::Failed { generation, .. } => Some(*generation),
        }
    }
}

/// Handle for submitting requests and reading results
#[derive(Clone)]
pub struct StatisticsWorkerHandle {
    sender: mpsc::Sender<StatisticsRequest>,
    state: watch::Receiver<StatisticsState>,
}

impl StatisticsWorkerHandle {
    /// Queues a request without waiting.
    ///
    /// Returns `false` if the queue is full or the worker has stopped.
    pub fn submit(&self, request: StatisticsRequest) -> bool {
        self.sender.try_send(request).is_ok()
    }

    /// Queues a request, waiting for room in the queue.
    pub async fn submit_async(&self, request: StatisticsRequest) -> bool {
        self.sender.send(request).await.is_ok()
    }

    /// Receiver that observes every published state change.
    pub fn subscribe(&self) -> watch::Receiver<StatisticsState> {
        self.state.clone()
    }

    /// Most recently published state.
    pub fn latest(&self) -> StatisticsState {
        self.state.borrow().clone()
    }

    /// Check if the worker is still running (channel not closed)
    pub fn is_active(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Configuration for the statistics worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Channel capacity for queued requests
    pub channel_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl WorkerConfig {
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

type JobResult = Result<StatisticsReport, EngineError>;

/// Single writer of the statistics state.
pub struct StatisticsWorker<S, Tz: TimeZone> {
    receiver: mpsc::Receiver<StatisticsRequest>,
    service: Arc<StatisticsService<S, Tz>>,
    state: watch::Sender<StatisticsState>,
    cancel: CancellationToken,
    generation: u64,
    in_flight: Option<CancellationToken>,
    jobs: JoinSet<JobResult>,
    job_generations: HashMap<tokio::task::Id, u64>,
}

impl<S, Tz> StatisticsWorker<S, Tz>
where
    S: RecordStore + 'static,
    Tz: TimeZone + Send + Sync + 'static,
{
    /// Creates a worker and its handle.
    ///
    /// The worker should be spawned as a tokio task:
    /// ```ignore
    /// tokio::spawn(worker.run());
    /// ```
    pub fn new(
        service: Arc<StatisticsService<S, Tz>>,
        config: &WorkerConfig,
        cancel: CancellationToken,
    ) -> (Self, StatisticsWorkerHandle) {
        let (sender, receiver) = mpsc::channel(config.channel_capacity.max(1));
        let (state, state_rx) = watch::channel(StatisticsState::Idle);

        let worker = Self {
            receiver,
            service,
            state,
            cancel,
            generation: 0,
            in_flight: None,
            jobs: JoinSet::new(),
            job_generations: HashMap::new(),
        };
        let handle = StatisticsWorkerHandle {
            sender,
            state: state_rx,
        };
        (worker, handle)
    }

    /// Runs until the token is cancelled or every handle is dropped.
    pub async fn run(mut self) {
        tracing::debug!("statistics worker started");

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    tracing::debug!(
                        pending = self.jobs.len(),
                        "statistics worker received shutdown signal"
                    );
                    if let Some(token) = self.in_flight.take() {
                        token.cancel();
                    }
                    self.jobs.shutdown().await;
                    break;
                }

                request = self.receiver.recv() => {
                    if let Some(request) = request {
                        self.dispatch(request);
                    } else {
                        tracing::debug!(
                            pending = self.jobs.len(),
                            "all handles dropped, finishing pending work"
                        );
                        while let Some(joined) = self.jobs.join_next_with_id().await {
                            self.complete(joined);
                        }
                        break;
                    }
                }

                Some(joined) = self.jobs.join_next_with_id(), if !self.jobs.is_empty() => {
                    self.complete(joined);
                }
            }
        }

        tracing::debug!(generation = self.generation, "statistics worker stopped");
    }

    /// Starts a job for the newest queued request, cancelling the previous one.
    fn dispatch(&mut self, mut request: StatisticsRequest) {
        self.generation += 1;
        let mut coalesced = 0usize;
        while let Ok(newer) = self.receiver.try_recv() {
            self.generation += 1;
            coalesced += 1;
            request = newer;
        }
        if coalesced > 0 {
            tracing::debug!(coalesced, "skipped superseded statistics requests");
        }

        let token = self.cancel.child_token();
        if let Some(previous) = self.in_flight.replace(token.clone()) {
            previous.cancel();
        }

        let generation = self.generation;
        let range = request.range.to_string();
        let service = Arc::clone(&self.service);
        let handle = self.jobs.spawn(async move {
            let window =
                service.resolve_window_at(&request.range, request.shift, request.requested_at);
            let entries = service
                .get_statistics(window, &request.filters, request.include_untracked, &token)
                .await?;
            Ok(StatisticsReport {
                generation,
                window,
                entries,
                requested_at: request.requested_at,
            })
        });
        self.job_generations.insert(handle.id(), generation);
        tracing::debug!(generation, %range, "dispatched statistics request");
    }

    fn complete(&mut self, joined: Result<(tokio::task::Id, JobResult), JoinError>) {
        let (id, outcome) = match joined {
            Ok((id, result)) => (id, result.map_err(JobFailure::Engine)),
            Err(err) => (err.id(), Err(JobFailure::Panicked(err.to_string()))),
        };
        let generation = self.job_generations.remove(&id).unwrap_or_default();

        if generation != self.generation {
            tracing::debug!(
                generation,
                latest = self.generation,
                "discarding stale statistics result"
            );
            return;
        }
        self.in_flight = None;

        match outcome {
            Ok(report) => {
                tracing::debug!(generation, entries = report.entries.len(), "statistics ready");
                self.state.send_replace(StatisticsState::Ready(Arc::new(report)));
            }
            Err(JobFailure::Engine(EngineError::Cancelled)) => {
                tracing::debug!(generation, "statistics request cancelled");
            }
            Err(failure) => {
                let message = failure.to_string();
                tracing::warn!(generation, error = %message, "statistics request failed");
                self.state
                    .send_replace(StatisticsState::Failed { generation, message });
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum JobFailure {
    #[error(transparent)]
    Engine(EngineError),

    #[error("statistics job panicked: {0}")]
    Panicked(String),
}
