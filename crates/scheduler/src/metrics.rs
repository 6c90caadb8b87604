use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::queue::QueueStats;
use crate::types::{Priority, TaskState};

/// Execution metrics recorded by pool workers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolMetrics {
    /// Tasks executed (either outcome) by priority.
    pub tasks_executed: HashMap<Priority, u64>,
    /// Tasks that ended in `Failed`, by priority.
    pub tasks_failed: HashMap<Priority, u64>,
    /// Average execution time by priority.
    pub avg_task_duration: HashMap<Priority, Duration>,
    /// Wall-clock time of the most recent completion.
    pub last_run: Option<DateTime<Utc>>,
}

impl PoolMetrics {
    /// Record a finished task execution.
    pub fn record_execution(&mut self, priority: Priority, duration: Duration, outcome: TaskState) {
        let count = {
            let executed = self.tasks_executed.entry(priority).or_default();
            *executed += 1;
            *executed
        };
        if outcome == TaskState::Failed {
            *self.tasks_failed.entry(priority).or_default() += 1;
        }
        self.last_run = Some(Utc::now());

        let prev_avg = self
            .avg_task_duration
            .get(&priority)
            .copied()
            .unwrap_or_default();

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let new_avg = if count == 1 {
            duration
        } else {
            let prev_nanos = prev_avg.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };

        self.avg_task_duration.insert(priority, new_avg);
    }

    pub fn total_executed(&self) -> u64 {
        self.tasks_executed.values().sum()
    }
}

/// Combined queue and pool view for dashboards and reports.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerSnapshot {
    pub queue: QueueStats,
    pub worker_threads: usize,
    pub active_workers: usize,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub pool_stopped: bool,
    pub metrics: PoolMetrics,
}
