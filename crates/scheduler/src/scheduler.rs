use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use frame_core::{FrameError, SchedulerConfig};
use tracing::info;

use crate::metrics::SchedulerSnapshot;
use crate::pool::WorkerPool;
use crate::queue::{PriorityTaskQueue, Rejected};
use crate::task::{Task, TaskHandle};
use crate::types::{Priority, RejectReason};

/// Interval at which [`Scheduler::wait_idle`] re-checks the queue.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Queue plus worker pool, built from one [`SchedulerConfig`].
///
/// Dropping the scheduler stops it.
pub struct Scheduler<C> {
    config: SchedulerConfig,
    queue: Arc<PriorityTaskQueue<C>>,
    pool: WorkerPool<C>,
}

impl<C: Send + Sync + 'static> Scheduler<C> {
    /// Validate `config`, create the queue and start the workers.
    pub fn start(config: SchedulerConfig, context: Arc<C>) -> Result<Self, FrameError> {
        config.validate()?;
        let queue = Arc::new(PriorityTaskQueue::from_config(&config));
        let pool = WorkerPool::start(
            config.resolved_worker_threads(),
            Arc::clone(&queue),
            context,
            config.poll_timeout(),
        )?;
        info!(
            capacity = config.queue_capacity,
            workers = pool.worker_count(),
            "Scheduler started"
        );
        Ok(Self {
            config,
            queue,
            pool,
        })
    }
}

impl<C> Scheduler<C> {
    /// Enqueue `body` at `priority`. Rejection is a normal outcome under load.
    pub fn submit<F>(&self, priority: Priority, body: F) -> Result<TaskHandle, RejectReason>
    where
        F: FnOnce(&C) -> anyhow::Result<()> + Send + 'static,
    {
        self.queue.submit(priority, body)
    }

    /// Enqueue a prebuilt task, handing it back on rejection.
    pub fn push(&self, task: Task<C>) -> Result<(), Rejected<C>> {
        self.queue.push(task)
    }

    /// Stop accepting work and join all workers. Blocking, idempotent.
    pub fn stop(&self) {
        self.pool.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.pool.is_stopped()
    }

    /// Block until the queue is empty and every popped task has finished,
    /// or until `timeout` elapses. Returns whether the scheduler went idle.
    ///
    /// A task a worker has popped but not yet started still counts, so a
    /// `true` result means the pool counters already include every task
    /// that left the queue.
    ///
    /// This does not stop submissions; callers wanting a graceful drain stop
    /// their producers first, wait here, then call [`Scheduler::stop`].
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.queue.is_idle() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(IDLE_POLL_INTERVAL);
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.size()
    }

    pub fn stats_by_priority(&self) -> HashMap<Priority, usize> {
        self.queue.stats_by_priority()
    }

    pub fn active_worker_count(&self) -> usize {
        self.pool.active_worker_count()
    }

    pub fn completed_task_count(&self) -> u64 {
        self.pool.completed_task_count()
    }

    pub fn failed_task_count(&self) -> u64 {
        self.pool.failed_task_count()
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            queue: self.queue.stats(),
            worker_threads: self.pool.worker_count(),
            active_workers: self.pool.active_worker_count(),
            completed_tasks: self.pool.completed_task_count(),
            failed_tasks: self.pool.failed_task_count(),
            pool_stopped: self.pool.is_stopped(),
            metrics: self.pool.metrics(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<PriorityTaskQueue<C>> {
        &self.queue
    }

    pub fn context(&self) -> &Arc<C> {
        self.pool.context()
    }
}
