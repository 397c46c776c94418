//! Background job execution.
//!
//! A fixed set of worker tasks share one bounded `mpsc` queue of
//! [`JobRequest`]s. [`WorkerPool::submit`] waits for queue capacity and
//! returns as soon as the request is enqueued; callers poll the entity's
//! status for the outcome.
//!
//! Jobs for the same entity are serialized. A request whose entity is
//! already running is parked behind it, and the worker running the entity
//! picks it up afterwards. A second reprocess of a document therefore runs
//! after the first one finished and its result is the final one, and
//! duplicate requests never keep a worker waiting while other entities
//! are queued.
//!
//! Each job runs in its own task. When it exceeds the configured deadline
//! it is aborted, and a panicking job is contained; both cases are
//! reported to [`JobRunner::on_abort`] so the entity does not stay
//! `processing`.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::JobsConfig;

/// A unit of background work, keyed by the entity it drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRequest {
    /// Extract text for a document id.
    Extract(String),
    /// Analyze a document id.
    Analyze(String),
    /// Generate a generated-document id.
    Generate(String),
}

impl JobRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            JobRequest::Extract(_) => "extraction",
            JobRequest::Analyze(_) => "analysis",
            JobRequest::Generate(_) => "generation",
        }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            JobRequest::Extract(id) | JobRequest::Analyze(id) | JobRequest::Generate(id) => id,
        }
    }

    fn lock_key(&self) -> String {
        format!("{}:{}", self.kind(), self.entity_id())
    }
}

/// Executes job requests. Implementations record the outcome on the
/// entity itself; nothing is returned to the pool.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run(&self, request: &JobRequest);
    /// The job did not finish (deadline exceeded or panic). `message`
    /// describes why; the entity should be failed with it.
    async fn on_abort(&self, request: &JobRequest, message: &str);
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker pool is shut down")]
    Closed,
}

/// Entities with a running job, each with the requests for it that
/// arrived in the meantime.
#[derive(Default)]
struct InFlight {
    entities: Mutex<HashMap<String, VecDeque<JobRequest>>>,
}

impl InFlight {
    fn entities(&self) -> MutexGuard<'_, HashMap<String, VecDeque<JobRequest>>> {
        self.entities.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the request's entity. If another worker already runs it the
    /// request is parked behind that job and `false` is returned.
    fn claim(&self, request: &JobRequest) -> bool {
        match self.entities().entry(request.lock_key()) {
            Entry::Occupied(mut parked) => {
                parked.get_mut().push_back(request.clone());
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(VecDeque::new());
                true
            }
        }
    }

    /// Next parked request for `key`. Releases the entity when none is left.
    fn next(&self, key: &str) -> Option<JobRequest> {
        let mut entities = self.entities();
        let parked = entities.get_mut(key)?.pop_front();
        if parked.is_none() {
            entities.remove(key);
        }
        parked
    }

    fn contains(&self, key: &str) -> bool {
        self.entities().contains_key(key)
    }
}

pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<JobRequest>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    in_flight: Arc<InFlight>,
}

impl WorkerPool {
    /// Spawn `config.workers` workers on the current runtime.
    pub fn start(runner: Arc<dyn JobRunner>, config: &JobsConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let in_flight = Arc::new(InFlight::default());
        let deadline = (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs));

        let handles = (0..config.workers.max(1))
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    rx.clone(),
                    runner.clone(),
                    in_flight.clone(),
                    deadline,
                ))
            })
            .collect();

        tracing::debug!(
            workers = config.workers.max(1),
            queue_capacity = config.queue_capacity.max(1),
            "worker pool started"
        );
        Self {
            sender: Mutex::new(Some(tx)),
            handles: Mutex::new(handles),
            in_flight,
        }
    }

    /// Whether a worker currently owns the request's entity (running it,
    /// or holding parked requests for it).
    pub fn is_running(&self, request: &JobRequest) -> bool {
        self.in_flight.contains(&request.lock_key())
    }

    /// Enqueue a request, waiting while the queue is full.
    pub async fn submit(&self, request: JobRequest) -> Result<(), WorkerError> {
        let tx = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(WorkerError::Closed)?;
        tracing::debug!(job = request.kind(), id = request.entity_id(), "job queued");
        tx.send(request).await.map_err(|_| WorkerError::Closed)
    }

    /// Stop accepting work, let the workers drain the queue, and wait for
    /// them to exit.
    pub async fn shutdown(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let handles: Vec<_> = std::mem::take(
            &mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "worker task ended abnormally");
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<JobRequest>>>,
    runner: Arc<dyn JobRunner>,
    in_flight: Arc<InFlight>,
    deadline: Option<Duration>,
) {
    loop {
        let next = rx.lock().await.recv().await;
        let Some(request) = next else {
            break;
        };
        if !in_flight.claim(&request) {
            tracing::debug!(worker_id, job = request.kind(), id = request.entity_id(), "entity busy, request parked");
            continue;
        }

        let key = request.lock_key();
        let mut current = Some(request);
        while let Some(request) = current {
            execute(worker_id, &request, &runner, deadline).await;
            current = in_flight.next(&key);
        }
    }
    tracing::debug!(worker_id, "worker exiting");
}

/// Run one request in its own task, enforcing the deadline and reporting
/// aborts to the runner.
async fn execute(
    worker_id: usize,
    request: &JobRequest,
    runner: &Arc<dyn JobRunner>,
    deadline: Option<Duration>,
) {
    tracing::debug!(worker_id, job = request.kind(), id = request.entity_id(), "job picked up");
    let mut task = {
        let runner = runner.clone();
        let request = request.clone();
        tokio::spawn(async move { runner.run(&request).await })
    };
    let outcome = match deadline {
        Some(limit) => match tokio::time::timeout(limit, &mut task).await {
            Ok(joined) => joined.map_err(|e| join_message(&e)),
            Err(_) => {
                task.abort();
                Err(format!("timed out after {}s", limit.as_secs()))
            }
        },
        None => task.await.map_err(|e| join_message(&e)),
    };
    if let Err(message) = outcome {
        tracing::error!(
            worker_id,
            job = request.kind(),
            id = request.entity_id(),
            error = %message,
            "job aborted"
        );
        runner.on_abort(request, &message).await;
    }
}

fn join_message(e: &tokio::task::JoinError) -> String {
    if e.is_panic() {
        "job panicked".to_string()
    } else {
        "job cancelled".to_string()
    }
}
