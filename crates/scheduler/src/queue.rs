//! Bounded, score-ordered task queue shared by producers and workers.
//!
//! All state (heap, counters, stopped flag) lives behind one mutex; a
//! single condvar wakes consumers on push and on stop. Task bodies never
//! run, and tasks are never dropped, while the lock is held.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use frame_core::SchedulerConfig;
use serde::Serialize;
use tracing::{debug, info};

use crate::heap::ScoreHeap;
use crate::task::{Task, TaskHandle};
use crate::types::{ExpiryBudgets, Priority, RejectReason};

/// A refused push. Hands the task back to the caller.
pub struct Rejected<C> {
    pub reason: RejectReason,
    pub task: Task<C>,
}

impl<C> fmt::Debug for Rejected<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("reason", &self.reason)
            .field("task_id", &self.task.id())
            .finish()
    }
}

/// Read-only snapshot of queue occupancy and admission counters.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub depth: usize,
    pub capacity: usize,
    pub ceiling: f64,
    pub stopped: bool,
    pub by_priority: HashMap<Priority, usize>,
    /// Tasks accepted by `push` since creation.
    pub admitted: u64,
    /// Tasks refused by `push` since creation.
    pub rejected: u64,
    /// Tasks discarded at dequeue for exceeding their wait budget.
    pub expired: u64,
    /// Tasks handed out by `pop` and not yet reported through `task_done`.
    pub in_flight: usize,
}

struct QueueState<C> {
    heap: ScoreHeap<C>,
    stopped: bool,
    depth_by_priority: [usize; 4],
    admitted: u64,
    rejected: u64,
    expired: u64,
    in_flight: usize,
}

pub struct PriorityTaskQueue<C> {
    inner: Mutex<QueueState<C>>,
    available: Condvar,
    capacity: usize,
    ceiling: f64,
    budgets: ExpiryBudgets,
}

impl<C> PriorityTaskQueue<C> {
    /// Create a queue with a soft `capacity`, a hard ceiling of
    /// `capacity * overflow_ratio`, and per-priority expiry budgets.
    pub fn new(capacity: usize, overflow_ratio: f64, budgets: ExpiryBudgets) -> Self {
        Self {
            inner: Mutex::new(QueueState {
                heap: ScoreHeap::new(),
                stopped: false,
                depth_by_priority: [0; 4],
                admitted: 0,
                rejected: 0,
                expired: 0,
                in_flight: 0,
            }),
            available: Condvar::new(),
            capacity,
            ceiling: capacity as f64 * overflow_ratio,
            budgets,
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(
            config.queue_capacity,
            config.overflow_ratio,
            ExpiryBudgets::from_config(&config.expiry),
        )
    }

    // The lock is never held across user code (bodies or the drop of
    // anything they captured), so a poisoned guard still protects
    // consistent state.
    fn lock(&self) -> MutexGuard<'_, QueueState<C>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Admit `task` unless the queue is stopped or over its limit for the
    /// task's priority. Wakes one waiting consumer on success.
    ///
    /// - below `High`: refused at or above `capacity`
    /// - any priority: refused at or above `capacity * overflow_ratio`
    pub fn push(&self, task: Task<C>) -> Result<(), Rejected<C>> {
        let mut state = self.lock();
        let depth = state.heap.len();

        let refusal = if state.stopped {
            Some(RejectReason::Stopped)
        } else if depth >= self.capacity && task.priority() < Priority::High {
            Some(RejectReason::QueueFull {
                priority: task.priority(),
                depth,
                capacity: self.capacity,
            })
        } else if depth as f64 >= self.ceiling {
            Some(RejectReason::HardCeiling {
                depth,
                ceiling: self.ceiling,
            })
        } else {
            None
        };

        if let Some(reason) = refusal {
            state.rejected += 1;
            drop(state);
            debug!(task_id = task.id(), priority = %task.priority(), %reason, "Task rejected");
            return Err(Rejected { reason, task });
        }

        state.depth_by_priority[task.priority().index()] += 1;
        state.admitted += 1;
        state.heap.push(task, Instant::now());
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Wrap `body` in a new task and push it.
    pub fn submit<F>(&self, priority: Priority, body: F) -> Result<TaskHandle, RejectReason>
    where
        F: FnOnce(&C) -> anyhow::Result<()> + Send + 'static,
    {
        let task = Task::new(priority, body);
        let handle = task.handle();
        self.push(task).map(|()| handle).map_err(|r| r.reason)
    }

    /// Take the highest-score task that has not exceeded its wait budget.
    ///
    /// Blocks until such a task appears, the queue is stopped and drained,
    /// or `timeout` elapses. `None` or a zero timeout blocks indefinitely.
    /// Expired tasks met on the way are discarded after the lock is
    /// released. A returned task counts as in flight until `task_done`.
    pub fn pop(&self, timeout: Option<Duration>) -> Option<Task<C>> {
        let deadline = timeout
            .filter(|t| !t.is_zero())
            .map(|t| Instant::now() + t);
        let mut state = self.lock();

        loop {
            let now = Instant::now();
            let mut expired = Vec::new();
            let mut next = None;
            while let Some(task) = state.heap.pop(now) {
                state.depth_by_priority[task.priority().index()] -= 1;
                if task.is_expired(now, self.budgets.for_priority(task.priority())) {
                    state.expired += 1;
                    debug!(
                        task_id = task.id(),
                        priority = %task.priority(),
                        waited_ms = task.waited(now).as_millis() as u64,
                        "Discarding expired task"
                    );
                    expired.push(task);
                    continue;
                }
                state.in_flight += 1;
                next = Some(task);
                break;
            }

            if next.is_some() || state.stopped {
                drop(state);
                drop(expired);
                return next;
            }
            if !expired.is_empty() {
                // Captured state may call back into the queue when dropped.
                drop(state);
                drop(expired);
                state = self.lock();
                continue;
            }

            state = match deadline {
                None => self
                    .available
                    .wait(state)
                    .unwrap_or_else(|e| e.into_inner()),
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return None;
                    }
                    self.available
                        .wait_timeout(state, remaining)
                        .unwrap_or_else(|e| e.into_inner())
                        .0
                }
            };
        }
    }

    /// Report that a task obtained from `pop` has finished executing.
    pub fn task_done(&self) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
    }

    /// Nothing queued and nothing handed out by `pop` still unfinished.
    /// Both are read under the same lock `pop` uses to hand tasks out.
    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        state.heap.is_empty() && state.in_flight == 0
    }

    /// Refuse all further pushes and wake every blocked consumer. Idempotent.
    pub fn stop(&self) {
        let mut state = self.lock();
        if !state.stopped {
            state.stopped = true;
            info!(remaining = state.heap.len(), "Task queue stopped");
        }
        drop(state);
        self.available.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    pub fn size(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().heap.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Hard ceiling (`capacity * overflow_ratio`).
    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    pub fn budgets(&self) -> &ExpiryBudgets {
        &self.budgets
    }

    /// Queued task count per priority. Every class is present.
    pub fn stats_by_priority(&self) -> HashMap<Priority, usize> {
        let state = self.lock();
        Priority::ALL
            .iter()
            .map(|p| (*p, state.depth_by_priority[p.index()]))
            .collect()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            depth: state.heap.len(),
            capacity: self.capacity,
            ceiling: self.ceiling,
            stopped: state.stopped,
            by_priority: Priority::ALL
                .iter()
                .map(|p| (*p, state.depth_by_priority[p.index()]))
                .collect(),
            admitted: state.admitted,
            rejected: state.rejected,
            expired: state.expired,
            in_flight: state.in_flight,
        }
    }
}

impl<C> fmt::Debug for PriorityTaskQueue<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("PriorityTaskQueue")
            .field("depth", &state.heap.len())
            .field("capacity", &self.capacity)
            .field("ceiling", &self.ceiling)
            .field("stopped", &state.stopped)
            .finish()
    }
}
