use std::fmt;
use std::time::Duration;

use frame_core::ExpiryConfig;
use serde::{Deserialize, Serialize};

/// Task urgency class. Higher rank = more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum Priority {
    /// Background work; ages fastest and is shed first.
    Low = 1,
    Normal = 2,
    /// Admitted past the soft capacity, up to the hard ceiling.
    High = 3,
    /// Never ages; always at the top of its class.
    Critical = 4,
}

impl Priority {
    /// All classes, most urgent first.
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    /// Numeric rank used as the score base (Low=1 … Critical=4).
    pub fn rank(self) -> u32 {
        self as u32
    }

    /// Score points gained per second of queue residency.
    pub fn aging_rate(self) -> f64 {
        match self {
            Priority::Critical => 0.0,
            Priority::High => 1.0,
            Priority::Normal => 2.0,
            Priority::Low => 5.0,
        }
    }

    /// Dense index for per-priority counter arrays.
    pub(crate) fn index(self) -> usize {
        self as usize - 1
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Critical => write!(f, "critical"),
            Priority::High => write!(f, "high"),
            Priority::Normal => write!(f, "normal"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// Execution state of a task. Only ever advances forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

/// How long a task of each priority may wait before it is shed at dequeue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryBudgets {
    pub critical: Duration,
    pub high: Duration,
    pub normal: Duration,
    pub low: Duration,
}

impl ExpiryBudgets {
    pub fn from_config(config: &ExpiryConfig) -> Self {
        Self {
            critical: Duration::from_millis(config.critical_ms),
            high: Duration::from_millis(config.high_ms),
            normal: Duration::from_millis(config.normal_ms),
            low: Duration::from_millis(config.low_ms),
        }
    }

    pub fn for_priority(&self, priority: Priority) -> Duration {
        match priority {
            Priority::Critical => self.critical,
            Priority::High => self.high,
            Priority::Normal => self.normal,
            Priority::Low => self.low,
        }
    }
}

impl Default for ExpiryBudgets {
    fn default() -> Self {
        Self::from_config(&ExpiryConfig::default())
    }
}

/// Why the queue refused a task. Expected under overload, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum RejectReason {
    #[error("queue stopped")]
    Stopped,
    #[error("queue full for {priority} priority ({depth}/{capacity})")]
    QueueFull {
        priority: Priority,
        depth: usize,
        capacity: usize,
    },
    #[error("queue at hard ceiling ({depth}/{ceiling})")]
    HardCeiling { depth: usize, ceiling: f64 },
}
