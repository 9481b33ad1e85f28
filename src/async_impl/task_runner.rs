use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::runtime::{Builder, Runtime};

use crate::error::{RegulatorError, RegulatorResult};

// ============================================================================
// TASK EVENTS - Delivered back to the submitting thread
// ============================================================================

#[derive(Error, Debug)]
pub enum TaskFailure {
    #[error(transparent)]
    Failed(#[from] RegulatorError),

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task ended without reporting an outcome")]
    Abandoned,
}

/// Every task yields exactly one outcome event followed by one `Finished`.
#[derive(Debug)]
pub enum TaskEvent<T> {
    Succeeded(T),
    Failed(TaskFailure),
    Finished,
}

pub struct TaskHandle<T> {
    id: u64,
    rx: Receiver<TaskEvent<T>>,
}

impl<T> TaskHandle<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Non-blocking poll, for event loops that drain handles each frame.
    pub fn try_event(&self) -> Option<TaskEvent<T>> {
        self.rx.try_recv().ok()
    }

    pub fn events(&self) -> &Receiver<TaskEvent<T>> {
        &self.rx
    }

    /// Blocks until the task is done and returns its outcome.
    pub fn wait(self) -> Result<T, TaskFailure> {
        let mut outcome = None;
        for event in self.rx.iter() {
            match event {
                TaskEvent::Succeeded(value) => outcome = Some(Ok(value)),
                TaskEvent::Failed(failure) => outcome = Some(Err(failure)),
                TaskEvent::Finished => break,
            }
        }
        outcome.unwrap_or(Err(TaskFailure::Abandoned))
    }

    /// Like `wait`, but hands the handle back if the task is still running.
    pub fn wait_timeout(self, timeout: Duration) -> Result<Result<T, TaskFailure>, Self> {
        let deadline = Instant::now() + timeout;
        let mut outcome = None;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(TaskEvent::Succeeded(value)) => outcome = Some(Ok(value)),
                Ok(TaskEvent::Failed(failure)) => outcome = Some(Err(failure)),
                Ok(TaskEvent::Finished) | Err(RecvTimeoutError::Disconnected) => {
                    return Ok(outcome.unwrap_or(Err(TaskFailure::Abandoned)));
                }
                Err(RecvTimeoutError::Timeout) => match outcome {
                    // Outcome already in hand; done is only moments away.
                    Some(result) => return Ok(result),
                    None => return Err(self),
                },
            }
        }
    }
}

/// Sends `Finished` when the task closure unwinds or returns.
struct DoneGuard<T> {
    id: u64,
    tx: Sender<TaskEvent<T>>,
    active: Arc<AtomicUsize>,
}

impl<T> Drop for DoneGuard<T> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
        let _ = self.tx.send(TaskEvent::Finished);
        debug!("[RUNNER] Task #{} done", self.id);
    }
}

// ============================================================================
// ASYNC TASK RUNNER - Worker pool for blocking instrument work
// ============================================================================

pub struct AsyncTaskRunner {
    runtime: Runtime,
    max_workers: usize,
    active: Arc<AtomicUsize>,
    next_id: AtomicU64,
}

impl AsyncTaskRunner {
    pub fn new(max_workers: usize) -> RegulatorResult<Self> {
        if max_workers == 0 {
            return Err(RegulatorError::Configuration(
                "task runner needs at least one worker".to_string(),
            ));
        }
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(max_workers)
            .thread_name("hv-task-runner")
            .build()?;
        info!("[RUNNER] Multithreading with maximum {} workers", max_workers);

        Ok(Self {
            runtime,
            max_workers,
            active: Arc::new(AtomicUsize::new(0)),
            next_id: AtomicU64::new(0),
        })
    }

    /// Queues `task` on a worker and returns at once. Tasks may finish in any
    /// order and cannot be cancelled once submitted.
    pub fn submit<T, F>(&self, task: F) -> TaskHandle<T>
    where
        F: FnOnce() -> RegulatorResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = unbounded();
        self.active.fetch_add(1, Ordering::AcqRel);

        let guard = DoneGuard {
            id,
            tx: tx.clone(),
            active: self.active.clone(),
        };
        self.runtime.spawn_blocking(move || {
            let _guard = guard;
            let event = match panic::catch_unwind(AssertUnwindSafe(task)) {
                Ok(Ok(value)) => TaskEvent::Succeeded(value),
                Ok(Err(e)) => {
                    warn!("[RUNNER] Task #{} failed: {}", id, e);
                    TaskEvent::Failed(TaskFailure::Failed(e))
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!("[RUNNER] Task #{} panicked: {}", id, message);
                    TaskEvent::Failed(TaskFailure::Panicked(message))
                }
            };
            let _ = tx.send(event);
        });

        TaskHandle { id, rx }
    }

    pub fn active_tasks(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Waits up to `timeout` for running tasks, then releases the workers.
    pub fn shutdown(self, timeout: Duration) {
        info!("[RUNNER] Shutting down with {} task(s) active", self.active_tasks());
        self.runtime.shutdown_timeout(timeout);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
