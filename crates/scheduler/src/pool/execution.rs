use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use frame_core::FrameError;
use tracing::debug;

use crate::metrics::PoolMetrics;
use crate::queue::PriorityTaskQueue;
use crate::task::Task;
use crate::types::TaskState;

use super::WorkerPool;

/// State moved into each worker thread.
struct Worker<C> {
    id: usize,
    queue: Arc<PriorityTaskQueue<C>>,
    context: Arc<C>,
    poll_timeout: Duration,
    shutdown: Arc<AtomicBool>,
    active_workers: Arc<AtomicUsize>,
    completed_tasks: Arc<AtomicU64>,
    failed_tasks: Arc<AtomicU64>,
    metrics: Arc<RwLock<PoolMetrics>>,
}

impl<C: Send + Sync + 'static> WorkerPool<C> {
    pub(super) fn spawn_worker(&self, id: usize) -> Result<(), FrameError> {
        let worker = Worker {
            id,
            queue: Arc::clone(&self.queue),
            context: Arc::clone(&self.context),
            poll_timeout: self.poll_timeout,
            shutdown: Arc::clone(&self.shutdown),
            active_workers: Arc::clone(&self.active_workers),
            completed_tasks: Arc::clone(&self.completed_tasks),
            failed_tasks: Arc::clone(&self.failed_tasks),
            metrics: Arc::clone(&self.metrics),
        };

        let handle = thread::Builder::new()
            .name(format!("frame-worker-{id}"))
            .spawn(move || worker.run())
            .map_err(|e| FrameError::Spawn(format!("worker {id}: {e}")))?;

        self.workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
        Ok(())
    }
}

impl<C> Worker<C> {
    /// Pop and execute until shutdown. The bounded `pop` timeout is what lets
    /// an idle worker notice the shutdown flag.
    fn run(self) {
        debug!(worker = self.id, "Worker thread started");

        while !self.shutdown.load(Ordering::Acquire) {
            let Some(task) = self.queue.pop(Some(self.poll_timeout)) else {
                continue;
            };
            self.execute(task);
        }

        debug!(worker = self.id, "Worker thread stopped");
    }

    fn execute(&self, mut task: Task<C>) {
        self.active_workers.fetch_add(1, Ordering::Relaxed);

        let start = Instant::now();
        let outcome = task.execute(self.context.as_ref());
        let duration = start.elapsed();

        debug!(
            worker = self.id,
            task_id = task.id(),
            priority = %task.priority(),
            duration_ms = duration.as_millis() as u64,
            ?outcome,
            "Task finished"
        );

        if let Ok(mut m) = self.metrics.write() {
            m.record_execution(task.priority(), duration, outcome);
        }
        if outcome == TaskState::Failed {
            self.failed_tasks.fetch_add(1, Ordering::Relaxed);
        }

        self.active_workers.fetch_sub(1, Ordering::Relaxed);
        self.completed_tasks.fetch_add(1, Ordering::Relaxed);
        // Last, so an idle queue implies the counters above are final.
        self.queue.task_done();
    }
}
