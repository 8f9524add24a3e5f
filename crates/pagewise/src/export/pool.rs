use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Upload queue is full ({capacity} pending)")]
    Saturated { capacity: usize },

    #[error("Upload pool is shut down")]
    Closed,
}

/// Fixed set of threads for blocking remote uploads.
///
/// The queue holds at most `2 × workers` tasks; submitting to a full queue
/// fails immediately instead of waiting.
pub struct UploadPool {
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
    capacity: usize,
}

impl UploadPool {
    /// A `worker_count` of 0 is treated as 1.
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let capacity = worker_count * 2;
        let (sender, receiver) = bounded::<Task>(capacity);

        let workers = (0..worker_count)
            .map(|worker_id| {
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("pagewise-upload-{}", worker_id))
                    .spawn(move || run_worker(worker_id, receiver))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    error!(error = %e, "Failed to spawn upload worker");
                    None
                }
            })
            .collect::<Vec<_>>();

        info!(workers = workers.len(), capacity, "Started upload pool");

        Self {
            sender: if workers.is_empty() { None } else { Some(sender) },
            workers,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queues `task` and returns a receiver for its result.
    pub fn submit<T, F>(&self, task: F) -> Result<oneshot::Receiver<T>, PoolError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(PoolError::Closed)?;
        let (result_tx, result_rx) = oneshot::channel();

        let job: Task = Box::new(move || {
            // The caller may have stopped waiting; nothing to do then.
            let _ = result_tx.send(task());
        });

        match sender.try_send(job) {
            Ok(()) => Ok(result_rx),
            Err(TrySendError::Full(_)) => Err(PoolError::Saturated {
                capacity: self.capacity,
            }),
            Err(TrySendError::Disconnected(_)) => Err(PoolError::Closed),
        }
    }

    /// Stops accepting work and waits for queued tasks to finish.
    pub fn shutdown(mut self) {
        self.sender.take();
        for (i, worker) in self.workers.drain(..).enumerate() {
            if worker.join().is_err() {
                error!(worker = i, "Upload worker panicked");
            }
        }
        debug!("Upload pool stopped");
    }
}

fn run_worker(worker_id: usize, receiver: Receiver<Task>) {
    debug!(worker = worker_id, "Upload worker started");

    while let Ok(task) = receiver.recv() {
        // A panicking task drops its result sender; the caller sees a closed
        // channel and falls back.
        if catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!(worker = worker_id, "Upload task panicked");
        }
    }

    debug!(worker = worker_id, "Upload worker stopped");
}
