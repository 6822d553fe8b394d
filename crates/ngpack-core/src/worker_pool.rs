use crossbeam_channel::{bounded, Receiver};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("Failed to start worker pool: {0}")]
    Build(String),

    #[error("Worker task panicked: {0}")]
    Panicked(String),

    #[error("Worker pool was terminated")]
    Terminated,
}

/// Fixed-size pool of worker threads. Jobs own all their inputs and report
/// back through a one-shot channel.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    max_workers: usize,
}

impl WorkerPool {
    pub fn new(name: &str, max_workers: usize) -> Result<Self, WorkerError> {
        let max_workers = max_workers.max(1);
        let prefix = name.to_string();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_workers)
            .thread_name(move |index| format!("{}-{}", prefix, index))
            .build()
            .map_err(|error| WorkerError::Build(error.to_string()))?;

        debug!(name, max_workers, "Started worker pool");
        Ok(WorkerPool { pool, max_workers })
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Queue `job`. A panic inside the job fails only that job.
    pub fn run<T, F>(&self, job: F) -> PendingTask<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (sender, receiver) = bounded(1);
        self.pool.spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(job))
                .map_err(|payload| WorkerError::Panicked(panic_message(payload.as_ref())));
            // The caller may have stopped waiting
            let _ = sender.send(result);
        });
        PendingTask { receiver }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Result of a queued job
pub struct PendingTask<T> {
    receiver: Receiver<Result<T, WorkerError>>,
}

impl<T> PendingTask<T> {
    /// Block until the job finishes
    pub fn wait(self) -> Result<T, WorkerError> {
        self.receiver
            .recv()
            .unwrap_or(Err(WorkerError::Terminated))
    }
}
