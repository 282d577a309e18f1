use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

/// Identity of one serial worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(u64);

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

impl WorkerId {
    fn next() -> Self {
        WorkerId(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

tokio::task_local! {
    /// Set to the worker's id while that worker is polling one of its jobs
    static OWNING_WORKER: WorkerId;
}

/// Error type for work submitted to the serial worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// The worker has shut down and accepts no more jobs
    Unavailable,
    /// The job was dropped before producing a result (it panicked)
    JobAborted,
}

impl std::fmt::Display for WorkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerError::Unavailable => write!(f, "serial worker unavailable"),
            WorkerError::JobAborted => write!(f, "serial worker job aborted"),
        }
    }
}

impl std::error::Error for WorkerError {}

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Messages for the serial worker
enum WorkerMessage {
    /// Run one job to completion before looking at the next message
    Run(Job),
    /// Graceful shutdown, after every job queued before it
    Shutdown { response_tx: oneshot::Sender<()> },
}

/// Actor that owns the queue and runs jobs one at a time
pub struct SerialWorker {
    id: WorkerId,
    rx: mpsc::UnboundedReceiver<WorkerMessage>,
    jobs_run: u64,
}

impl SerialWorker {
    /// Run the actor loop
    pub async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                WorkerMessage::Run(job) => {
                    // A panicking job drops its result sender; the caller sees
                    // JobAborted and the worker keeps serving.
                    let outcome = AssertUnwindSafe(OWNING_WORKER.scope(self.id, job()))
                        .catch_unwind()
                        .await;
                    if outcome.is_err() {
                        error!(worker = self.id.0, "serial worker job panicked");
                    }
                    self.jobs_run += 1;
                }
                WorkerMessage::Shutdown { response_tx } => {
                    info!(worker = self.id.0, jobs = self.jobs_run, "serial worker shutting down");
                    let _ = response_tx.send(());
                    break;
                }
            }
        }
    }
}

/// Handle for submitting work to the serial worker
#[derive(Clone)]
pub struct WorkerHandle {
    id: WorkerId,
    tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl WorkerHandle {
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// True when the caller is already running as one of this worker's jobs
    pub fn owns_current_context(&self) -> bool {
        OWNING_WORKER
            .try_with(|owner| *owner == self.id)
            .unwrap_or(false)
    }

    /// Run `job` on the worker and wait for its result.
    ///
    /// From outside the worker the job is queued behind everything submitted
    /// earlier. From inside one of the worker's own jobs it runs inline.
    /// Jobs must not `tokio::spawn` work that calls back into the worker and
    /// then wait for it: the spawned task is outside the worker's context and
    /// would queue behind the job that is waiting for it.
    pub async fn run<F, Fut, T>(&self, job: F) -> Result<T, WorkerError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.owns_current_context() {
            debug!(worker = self.id.0, "running nested job inline");
            return Ok(job().await);
        }

        let (result_tx, result_rx) = oneshot::channel();
        let boxed: Job = Box::new(move || {
            async move {
                let out = job().await;
                let _ = result_tx.send(out);
            }
            .boxed()
        });

        self.tx
            .send(WorkerMessage::Run(boxed))
            .map_err(|_| WorkerError::Unavailable)?;
        result_rx.await.map_err(|_| WorkerError::JobAborted)
    }

    /// Graceful shutdown. Jobs queued before this call still run.
    pub async fn shutdown(&self) {
        let (response_tx, response_rx) = oneshot::channel();
        if self.tx.send(WorkerMessage::Shutdown { response_tx }).is_ok() {
            let _ = response_rx.await;
        }
    }
}

/// Spawn a serial worker and return its handle + join handle
pub fn spawn_serial_worker() -> (WorkerHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = WorkerId::next();
    let worker = SerialWorker { id, rx, jobs_run: 0 };
    let task = tokio::spawn(worker.run());
    (WorkerHandle { id, tx }, task)
}
