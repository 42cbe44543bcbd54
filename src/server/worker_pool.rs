//! Worker Pool
//!
//! Fixed-size pool of named OS threads executing fire-and-forget jobs.
//! The expiration engine runs one pool for index scanners and one for key
//! deleters.

use crossbeam::channel::{self, Receiver, Sender};
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::metrics::Metrics;

/// A unit of work submitted to the pool.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Error)]
pub enum WorkerPoolError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Fixed-size worker pool.
///
/// Jobs are queued on an unbounded channel, so [`WorkerPool::schedule`]
/// never blocks the caller. Workers pull in FIFO order; ordering across
/// workers is not guaranteed. A panicking job is contained and logged; the
/// worker keeps running.
pub struct WorkerPool {
    name: String,
    sender: Sender<Job>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `num_workers` named threads.
    pub fn startup(
        name: &str,
        num_workers: usize,
        metrics: Arc<Metrics>,
    ) -> Result<Self, WorkerPoolError> {
        let (sender, receiver) = channel::unbounded::<Job>();
        let mut handles = Vec::with_capacity(num_workers);

        for i in 0..num_workers {
            let receiver = receiver.clone();
            let metrics = metrics.clone();
            let pool_name = name.to_string();
            let handle = thread::Builder::new()
                .name(format!("{name}-{i}"))
                .spawn(move || {
                    debug!(pool = %pool_name, worker = i, "worker started");
                    Self::worker_loop(&pool_name, i, receiver, metrics);
                    debug!(pool = %pool_name, worker = i, "worker stopped");
                })?;
            handles.push(handle);
        }

        info!(pool = name, workers = num_workers, "worker pool started");
        Ok(Self {
            name: name.to_string(),
            sender,
            handles,
        })
    }

    /// Enqueue a job. Never blocks; a job scheduled after [`WorkerPool::stop`]
    /// is dropped.
    pub fn schedule<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.sender.send(Box::new(job)).is_err() {
            debug!(pool = %self.name, "pool stopped, job dropped");
        }
    }

    /// Number of jobs queued but not yet picked up.
    pub fn queued(&self) -> usize {
        self.sender.len()
    }

    /// Close the queue, drain remaining jobs, and join every worker.
    pub fn stop(self) {
        info!(pool = %self.name, "worker pool stopping");
        drop(self.sender);
        for handle in self.handles {
            let _ = handle.join();
        }
    }

    fn worker_loop(pool: &str, worker: usize, receiver: Receiver<Job>, metrics: Arc<Metrics>) {
        while let Ok(job) = receiver.recv() {
            let start = Instant::now();
            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                error!(pool, worker, "job panicked; worker continues");
                metrics.record_failure(pool);
            }
            metrics.record_job(pool, start.elapsed());
        }
    }
}
