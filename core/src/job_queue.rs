/// Per-destination job queues: strictly one job at a time, FIFO, deduplicated
/// by message identifier
use crate::error::Result;
use futures_util::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify, RwLock};
use tracing::{debug, error, warn};

type Job = BoxFuture<'static, Result<()>>;

/// Serial executor for one destination
pub struct JobQueue {
    destination: String,
    tx: mpsc::UnboundedSender<(String, Job)>,
    outstanding: Arc<Mutex<HashSet<String>>>,
    idle: Arc<Notify>,
}

impl JobQueue {
    /// Create the queue and spawn its worker. Must be called inside a tokio runtime.
    pub fn new(destination: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let outstanding = Arc::new(Mutex::new(HashSet::new()));
        let idle = Arc::new(Notify::new());

        tokio::spawn(run_worker(
            destination.to_string(),
            rx,
            outstanding.clone(),
            idle.clone(),
        ));

        Self {
            destination: destination.to_string(),
            tx,
            outstanding,
            idle,
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Whether a job for `id` is queued or running
    pub async fn has(&self, id: &str) -> bool {
        self.outstanding.lock().await.contains(id)
    }

    /// Enqueue `job` under `id` unless one is already outstanding.
    /// Returns whether the job was accepted.
    pub async fn add_with_id<F>(&self, id: &str, job: F) -> bool
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let mut outstanding = self.outstanding.lock().await;
        if outstanding.contains(id) {
            debug!(destination = %self.destination, job_id = %id, "Job already queued");
            return false;
        }

        if self.tx.send((id.to_string(), Box::pin(job))).is_err() {
            error!(destination = %self.destination, job_id = %id, "Job queue worker is gone");
            return false;
        }
        outstanding.insert(id.to_string());
        true
    }

    pub async fn pending_count(&self) -> usize {
        self.outstanding.lock().await.len()
    }

    /// Resolve once no job is queued or running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.outstanding.lock().await.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

async fn run_worker(
    destination: String,
    mut rx: mpsc::UnboundedReceiver<(String, Job)>,
    outstanding: Arc<Mutex<HashSet<String>>>,
    idle: Arc<Notify>,
) {
    while let Some((id, job)) = rx.recv().await {
        // Own task so a panicking job cannot take the worker down
        match tokio::spawn(job).await {
            Ok(Ok(())) => debug!(destination = %destination, job_id = %id, "Job finished"),
            Ok(Err(e)) => warn!(destination = %destination, job_id = %id, error = %e, "Job failed"),
            Err(e) => error!(destination = %destination, job_id = %id, error = %e, "Job aborted"),
        }

        let now_idle = {
            let mut outstanding = outstanding.lock().await;
            outstanding.remove(&id);
            outstanding.is_empty()
        };
        if now_idle {
            idle.notify_waiters();
        }
    }
    debug!(destination = %destination, "Job queue worker stopped");
}

/// Lazily populated destination → queue map, owned by one delivery queue
#[derive(Clone, Default)]
pub struct JobQueues {
    queues: Arc<RwLock<HashMap<String, Arc<JobQueue>>>>,
}

impl JobQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create(&self, destination: &str) -> Arc<JobQueue> {
        {
            let queues = self.queues.read().await;
            if let Some(queue) = queues.get(destination) {
                return queue.clone();
            }
        }

        let mut queues = self.queues.write().await;
        queues
            .entry(destination.to_string())
            .or_insert_with(|| Arc::new(JobQueue::new(destination)))
            .clone()
    }

    pub async fn get(&self, destination: &str) -> Option<Arc<JobQueue>> {
        self.queues.read().await.get(destination).cloned()
    }

    pub async fn len(&self) -> usize {
        self.queues.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Wait until every queue has drained
    pub async fn wait_all_idle(&self) {
        let queues: Vec<Arc<JobQueue>> = self.queues.read().await.values().cloned().collect();
        for queue in queues {
            queue.wait_idle().await;
        }
    }
}
