use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use frame_core::FrameError;
use tracing::{info, warn};

use crate::metrics::PoolMetrics;
use crate::queue::PriorityTaskQueue;

/// A fixed set of worker threads sharing one queue and one execution context.
///
/// Workers start on construction and run until [`WorkerPool::stop`] (or drop).
/// The context is shared by reference with every task body; the pool does
/// not synchronize access to it.
pub struct WorkerPool<C> {
    pub(super) queue: Arc<PriorityTaskQueue<C>>,
    pub(super) context: Arc<C>,
    pub(super) workers: Mutex<Vec<JoinHandle<()>>>,
    pub(super) worker_count: usize,
    /// How long an idle worker blocks in `pop` before re-checking shutdown.
    pub(super) poll_timeout: Duration,
    /// Shutdown signal.
    pub(super) shutdown: Arc<AtomicBool>,
    /// Workers currently executing a task.
    pub(super) active_workers: Arc<AtomicUsize>,
    /// Tasks executed to completion or failure.
    pub(super) completed_tasks: Arc<AtomicU64>,
    pub(super) failed_tasks: Arc<AtomicU64>,
    pub(super) metrics: Arc<RwLock<PoolMetrics>>,
}

impl<C: Send + Sync + 'static> WorkerPool<C> {
    /// Spawn `worker_count` workers draining `queue`.
    pub fn start(
        worker_count: usize,
        queue: Arc<PriorityTaskQueue<C>>,
        context: Arc<C>,
        poll_timeout: Duration,
    ) -> Result<Self, FrameError> {
        if worker_count == 0 {
            return Err(FrameError::Config("worker pool needs at least one worker".into()));
        }
        if poll_timeout.is_zero() {
            return Err(FrameError::Config("worker poll timeout must be > 0".into()));
        }

        let pool = Self {
            queue,
            context,
            workers: Mutex::new(Vec::with_capacity(worker_count)),
            worker_count,
            poll_timeout,
            shutdown: Arc::new(AtomicBool::new(false)),
            active_workers: Arc::new(AtomicUsize::new(0)),
            completed_tasks: Arc::new(AtomicU64::new(0)),
            failed_tasks: Arc::new(AtomicU64::new(0)),
            metrics: Arc::new(RwLock::new(PoolMetrics::default())),
        };

        for id in 0..worker_count {
            if let Err(e) = pool.spawn_worker(id) {
                pool.stop();
                return Err(e);
            }
        }

        info!(
            "Worker pool started with {} workers (poll timeout {:?})",
            worker_count, poll_timeout
        );
        Ok(pool)
    }
}

impl<C> WorkerPool<C> {
    /// Stop the queue, then wait for every worker to finish its current task
    /// and exit. Blocking; later calls are no-ops.
    pub fn stop(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Worker pool shutdown requested");
        self.queue.stop();

        let handles = std::mem::take(&mut *self.workers.lock().unwrap_or_else(|e| e.into_inner()));
        let current = thread::current().id();
        for handle in handles {
            // A task body may stop its own pool; never join ourselves.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("Worker thread exited with a panic");
            }
        }

        info!(
            completed = self.completed_task_count(),
            failed = self.failed_task_count(),
            "Worker pool stopped"
        );
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Workers currently inside a task body.
    pub fn active_worker_count(&self) -> usize {
        self.active_workers.load(Ordering::Relaxed)
    }

    /// Tasks executed so far, whether they completed or failed.
    pub fn completed_task_count(&self) -> u64 {
        self.completed_tasks.load(Ordering::Relaxed)
    }

    pub fn failed_task_count(&self) -> u64 {
        self.failed_tasks.load(Ordering::Relaxed)
    }

    /// Get a snapshot of the current execution metrics.
    pub fn metrics(&self) -> PoolMetrics {
        self.metrics
            .read()
            .map(|m| m.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    pub fn queue(&self) -> &Arc<PriorityTaskQueue<C>> {
        &self.queue
    }

    pub fn context(&self) -> &Arc<C> {
        &self.context
    }
}

impl<C> Drop for WorkerPool<C> {
    fn drop(&mut self) {
        self.stop();
    }
}
