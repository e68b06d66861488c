//! Fixed-size worker pool with timeout fallback
//!
//! Workers pull boxed jobs from a shared channel. `submit` blocks the
//! caller on a result channel with a per-task timeout; on timeout the task
//! is re-run on the calling thread and the worker's eventual result is
//! dropped on the floor (the result channel's receiver is gone by then).

use crate::CancellationToken;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Configuration for the task pool.
#[derive(Debug, Clone)]
pub struct TaskPoolConfig {
    /// Number of worker threads to spawn.
    /// Default: available hardware concurrency, or 4 when unknown.
    pub num_workers: usize,

    /// Maximum time to wait for a dispatched task before falling back to
    /// the calling thread. Default: 30 seconds.
    pub task_timeout: Duration,
}

impl Default for TaskPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus(),
            task_timeout: Duration::from_secs(30),
        }
    }
}

impl TaskPoolConfig {
    /// Create a configuration with an explicit worker count.
    pub fn with_workers(num_workers: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
            ..Default::default()
        }
    }

    /// Set the per-task timeout.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }
}

/// Fixed-size pool of worker threads for stateless document tasks.
///
/// Tasks are `Fn` closures behind an `Arc` so a timed-out task can be
/// executed a second time on the calling thread. Tasks must therefore be
/// idempotent and operate on owned copies of their input, never on shared
/// mutable state.
pub struct TaskPool {
    sender: Sender<Job>,
    workers: Vec<Worker>,
    config: TaskPoolConfig,
}

impl TaskPool {
    /// Create and start a pool with the given configuration.
    pub fn new(config: TaskPoolConfig) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..config.num_workers)
            .map(|id| Worker::new(id, Arc::clone(&receiver)))
            .collect();

        Self {
            sender,
            workers,
            config,
        }
    }

    /// Get the number of worker threads.
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Run a task on the pool and wait for its result.
    ///
    /// If every worker is busy the job queues until one frees up. If no
    /// result arrives within the configured timeout, the task is retried on
    /// the calling thread; the worker's late result (if any) is ignored.
    pub fn submit<T: Send + 'static>(&self, task: Arc<dyn Fn() -> T + Send + Sync>) -> T {
        let (result_tx, result_rx) = mpsc::channel();

        let job_task = Arc::clone(&task);
        let job: Job = Box::new(move || {
            let _ = result_tx.send(job_task());
        });

        if self.sender.send(job).is_err() {
            // Pool is shutting down; run directly.
            return task();
        }

        match result_rx.recv_timeout(self.config.task_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                log::warn!(
                    "pool task exceeded {:?}, retrying on calling thread",
                    self.config.task_timeout
                );
                task()
            }
        }
    }

    /// Like [`submit`](Self::submit), but skipped entirely if the token is
    /// already cancelled, and the fallback is suppressed for tasks whose
    /// caller cancelled while waiting.
    pub fn submit_cancellable<T: Send + 'static>(
        &self,
        task: Arc<dyn Fn() -> T + Send + Sync>,
        token: &CancellationToken,
    ) -> Option<T> {
        if token.is_cancelled() {
            return None;
        }

        let (result_tx, result_rx) = mpsc::channel();
        let job_task = Arc::clone(&task);
        let job_token = token.clone();
        let job: Job = Box::new(move || {
            if job_token.is_cancelled() {
                return;
            }
            let _ = result_tx.send(job_task());
        });

        if self.sender.send(job).is_err() {
            return Some(task());
        }

        match result_rx.recv_timeout(self.config.task_timeout) {
            Ok(result) => Some(result),
            Err(_) if token.is_cancelled() => None,
            Err(_) => {
                log::warn!(
                    "pool task exceeded {:?}, retrying on calling thread",
                    self.config.task_timeout
                );
                Some(task())
            }
        }
    }

    /// Run a job without waiting for a result.
    pub fn spawn(&self, job: impl FnOnce() + Send + 'static) {
        let _ = self.sender.send(Box::new(job));
    }

    /// Shut the pool down, waiting for workers to finish their current job.
    pub fn shutdown(self) {
        // Dropping the sender closes the channel; workers exit when the
        // queue drains.
        drop(self.sender);
        for worker in self.workers {
            worker.join();
        }
    }
}

/// A single worker thread in the pool.
struct Worker {
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn new(id: usize, receiver: Arc<Mutex<Receiver<Job>>>) -> Self {
        let thread = thread::Builder::new()
            .name(format!("pdf-task-worker-{id}"))
            .spawn(move || loop {
                let job = {
                    let guard = receiver.lock().unwrap();
                    guard.recv()
                };
                match job {
                    Ok(job) => job(),
                    Err(_) => break,
                }
            })
            .expect("failed to spawn worker thread");

        Self {
            thread: Some(thread),
        }
    }

    fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            thread.join().expect("worker thread panicked");
        }
    }
}

/// Get the number of logical CPU cores, defaulting to 4 when unknown.
fn num_cpus() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
