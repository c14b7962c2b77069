use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use tokio::sync::{Semaphore, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::plan::{Isolation, WorkerPlan};

const HEAVY_STACK_SIZE: usize = 8 * 1024 * 1024;

/// How a submitted job ended.
#[derive(Debug)]
pub enum TaskOutcome<T> {
    Completed(T),
    TimedOut(Duration),
    Panicked(String),
    /// The stop flag was raised before the job got a worker slot.
    Cancelled,
    /// No worker could be started for the job.
    Unavailable(String),
}

/// Bounded pool of conversion workers.
///
/// At most `workers` jobs run at once. A job that exceeds its timeout
/// gives its slot back immediately; the thread running it is left to
/// finish on its own and its result is discarded.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    isolation: Isolation,
    stop: Arc<AtomicBool>,
    spawned: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(plan: WorkerPlan, stop: Arc<AtomicBool>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(plan.workers.max(1))),
            isolation: plan.isolation,
            stop,
            spawned: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn isolation(&self) -> Isolation {
        self.isolation
    }

    /// Queue `job`. Must be called from within a tokio runtime.
    pub fn submit<F, T>(&self, job: F, timeout: Duration) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        let stop = Arc::clone(&self.stop);
        let isolation = self.isolation;
        let worker_id = self.spawned.fetch_add(1, Ordering::Relaxed);

        let inner = tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return TaskOutcome::Cancelled;
            };
            if stop.load(Ordering::SeqCst) {
                return TaskOutcome::Cancelled;
            }

            match isolation {
                Isolation::Lightweight => run_blocking(job, timeout).await,
                Isolation::Heavyweight => run_dedicated(job, timeout, worker_id).await,
            }
        });

        TaskHandle { inner }
    }
}

async fn run_blocking<F, T>(job: F, timeout: Duration) -> TaskOutcome<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(job)).await {
        Ok(Ok(value)) => TaskOutcome::Completed(value),
        Ok(Err(e)) if e.is_panic() => TaskOutcome::Panicked(panic_message(e.into_panic())),
        Ok(Err(_)) => TaskOutcome::Cancelled,
        Err(_) => TaskOutcome::TimedOut(timeout),
    }
}

async fn run_dedicated<F, T>(job: F, timeout: Duration, worker_id: usize) -> TaskOutcome<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let spawned = thread::Builder::new()
        .name(format!("flatline-worker-{worker_id}"))
        .stack_size(HEAVY_STACK_SIZE)
        .spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(job));
            // receiver is gone after a timeout
            let _ = tx.send(result);
        });

    if let Err(e) = spawned {
        return TaskOutcome::Unavailable(format!("failed to start worker thread: {e}"));
    }

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(Ok(value))) => TaskOutcome::Completed(value),
        Ok(Ok(Err(payload))) => TaskOutcome::Panicked(panic_message(payload)),
        Ok(Err(_)) => TaskOutcome::Panicked("worker exited without a result".to_string()),
        Err(_) => {
            debug!(worker_id, "detaching timed out worker thread");
            TaskOutcome::TimedOut(timeout)
        }
    }
}

/// Handle to one submitted job.
pub struct TaskHandle<T> {
    inner: JoinHandle<TaskOutcome<T>>,
}

impl<T> TaskHandle<T> {
    pub async fn await_result(self) -> TaskOutcome<T> {
        match self.inner.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => TaskOutcome::Panicked(panic_message(e.into_panic())),
            Err(_) => TaskOutcome::Cancelled,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
