//! Process-local priority task scheduler.
//!
//! Producers push [`Task`]s into a bounded [`PriorityTaskQueue`] ordered by
//! an aging score; a fixed [`WorkerPool`] pops and executes them against a
//! shared execution context. [`Scheduler`] wires both from a
//! [`SchedulerConfig`](frame_core::SchedulerConfig).

mod heap;
pub mod metrics;
pub mod pool;
pub mod queue;
pub mod scheduler;
pub mod task;
pub mod types;

pub use metrics::{PoolMetrics, SchedulerSnapshot};
pub use pool::WorkerPool;
pub use queue::{PriorityTaskQueue, QueueStats, Rejected};
pub use scheduler::Scheduler;
pub use task::{score, Task, TaskBody, TaskHandle, TaskId};
pub use types::{ExpiryBudgets, Priority, RejectReason, TaskState};
