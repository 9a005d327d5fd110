//! In-process broker: each queue is consumed by one registered [`Worker`],
//! and every submission runs as its own tokio task.

use crate::dispatch::{Dispatcher, JobHandle, WorkerFailure};
use crate::error::{JobscribeError, Result};
use crate::job::status::SubJobState;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::debug;
use uuid::Uuid;

/// Something that can execute sub-jobs taken from a queue.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Run one sub-job and return its JSON result.
    async fn run(&self, task: &str, args: Value) -> std::result::Result<Value, WorkerFailure>;

    /// Whether the worker can currently take work.
    fn is_ready(&self) -> bool {
        true
    }
}

/// Worker backed by a plain function, for in-process services and tests.
pub struct FnWorker<F> {
    f: F,
}

impl<F> FnWorker<F>
where
    F: Fn(&str, Value) -> std::result::Result<Value, WorkerFailure> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Worker for FnWorker<F>
where
    F: Fn(&str, Value) -> std::result::Result<Value, WorkerFailure> + Send + Sync,
{
    async fn run(&self, task: &str, args: Value) -> std::result::Result<Value, WorkerFailure> {
        (self.f)(task, args)
    }
}

struct Registration {
    capability: String,
    worker: Arc<dyn Worker>,
}

struct Entry {
    join: Option<JoinHandle<std::result::Result<Value, WorkerFailure>>>,
    abort: AbortHandle,
    state: watch::Receiver<SubJobState>,
}

/// Dispatcher that runs workers inside the current process.
pub struct LocalDispatcher {
    queues: HashMap<String, Registration>,
    jobs: Mutex<HashMap<Uuid, Entry>>,
    submitted: AtomicUsize,
    revoked: AtomicUsize,
}

impl LocalDispatcher {
    pub fn new() -> Self {
        Self {
            queues: HashMap::new(),
            jobs: Mutex::new(HashMap::new()),
            submitted: AtomicUsize::new(0),
            revoked: AtomicUsize::new(0),
        }
    }

    /// Registers `worker` as the consumer of `queue`, advertised as `capability`.
    pub fn with_worker(mut self, capability: &str, queue: &str, worker: Arc<dyn Worker>) -> Self {
        self.register(capability, queue, worker);
        self
    }

    /// Registers `worker` as the consumer of `queue`, replacing any previous one.
    pub fn register(&mut self, capability: &str, queue: &str, worker: Arc<dyn Worker>) {
        self.queues.insert(
            queue.to_string(),
            Registration {
                capability: capability.to_string(),
                worker,
            },
        );
    }

    /// Number of sub-jobs submitted so far.
    pub fn submitted_count(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Number of sub-jobs revoked so far.
    pub fn revoked_count(&self) -> usize {
        self.revoked.load(Ordering::SeqCst)
    }

    /// Registered queue names, sorted.
    pub fn queues(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.queues.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for LocalDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dispatcher for LocalDispatcher {
    async fn submit(&self, task: &str, queue: &str, args: Value) -> Result<JobHandle> {
        let registration = self
            .queues
            .get(queue)
            .ok_or_else(|| JobscribeError::Dispatch {
                task: task.to_string(),
                queue: queue.to_string(),
                message: "no worker consumes this queue".to_string(),
            })?;

        let handle = JobHandle::new(task, queue);
        let (state_tx, state_rx) = watch::channel(SubJobState::Pending);
        let worker = Arc::clone(&registration.worker);
        let task_name = task.to_string();

        let join = tokio::spawn(async move {
            state_tx.send_replace(SubJobState::Started);
            let outcome = worker.run(&task_name, args).await;
            state_tx.send_replace(if outcome.is_ok() {
                SubJobState::Success
            } else {
                SubJobState::Failure
            });
            outcome
        });

        let entry = Entry {
            abort: join.abort_handle(),
            join: Some(join),
            state: state_rx,
        };
        self.jobs.lock().await.insert(handle.id(), entry);
        self.submitted.fetch_add(1, Ordering::SeqCst);
        debug!(handle = %handle, "sub-job submitted");

        Ok(handle)
    }

    async fn wait(&self, handle: &JobHandle) -> std::result::Result<Value, WorkerFailure> {
        let join = {
            let mut jobs = self.jobs.lock().await;
            jobs.get_mut(&handle.id()).and_then(|entry| entry.join.take())
        };
        let Some(join) = join else {
            return Err(WorkerFailure::new(format!(
                "sub-job {handle} is unknown, revoked or already collected"
            )));
        };

        let outcome = match join.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => Err(WorkerFailure::new("sub-job was revoked")),
            Err(e) => Err(WorkerFailure::new(format!("worker panicked: {e}"))),
        };

        // Collected results are forgotten, like a broker expiring them.
        self.jobs.lock().await.remove(&handle.id());
        outcome
    }

    async fn status(&self, handle: &JobHandle) -> SubJobState {
        match self.jobs.lock().await.get(&handle.id()) {
            Some(entry) => *entry.state.borrow(),
            // Brokers report unknown ids, revoked ones included, as pending.
            None => SubJobState::Pending,
        }
    }

    /// Aborts the sub-job and forgets it; nobody collects a revoked result.
    async fn revoke(&self, handle: &JobHandle) {
        let removed = self.jobs.lock().await.remove(&handle.id());
        match removed {
            Some(entry) => {
                entry.abort.abort();
                self.revoked.fetch_add(1, Ordering::SeqCst);
                debug!(handle = %handle, "sub-job revoked");
            }
            None => debug!(handle = %handle, "revoke of unknown or collected sub-job ignored"),
        }
    }

    async fn active_capabilities(&self) -> Result<HashSet<String>> {
        Ok(self
            .queues
            .values()
            .filter(|r| r.worker.is_ready())
            .map(|r| r.capability.clone())
            .collect())
    }
}
