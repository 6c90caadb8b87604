use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::error;

use crate::types::{Priority, TaskState};

/// Process-unique, monotonically increasing task identifier.
pub type TaskId = u64;

/// Work executed against the shared context. Invoked at most once.
pub type TaskBody<C> = Box<dyn FnOnce(&C) -> anyhow::Result<()> + Send + 'static>;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Score base per priority rank. Dominates aging within any realistic wait.
const RANK_WEIGHT: f64 = 1_000_000.0;

/// Ranking key for the queue; higher = more urgent.
///
/// `rank * 1e6 + whole_seconds_waited * aging_rate - subsec_micros * 1e-6`.
/// The last term makes earlier submissions sort first among otherwise equal
/// scores. It only looks at the sub-second part of the wall clock, so FIFO
/// holds approximately, within a class and time window.
pub fn score(priority: Priority, waited: Duration, submitted_subsec_micros: u32) -> f64 {
    let base = f64::from(priority.rank()) * RANK_WEIGHT;
    let aging = waited.as_secs() as f64 * priority.aging_rate();
    let tie_break = f64::from(submitted_subsec_micros % 1_000_000) * 0.000_001;
    base + aging - tie_break
}

// ── Shared status ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct StatusInner {
    state: TaskState,
    /// Set when a task is dropped while still pending (expired, or torn down with the queue).
    dropped: bool,
}

#[derive(Debug)]
struct TaskStatus {
    inner: Mutex<StatusInner>,
    changed: Condvar,
}

impl TaskStatus {
    fn new() -> Self {
        Self {
            inner: Mutex::new(StatusInner {
                state: TaskState::Pending,
                dropped: false,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatusInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn advance(&self, next: TaskState) {
        let mut inner = self.lock();
        debug_assert!(!inner.state.is_terminal(), "task state moved backwards");
        inner.state = next;
        drop(inner);
        self.changed.notify_all();
    }
}

// ── Task ──────────────────────────────────────────────────────

/// A unit of work: body, priority, identity and submission time.
///
/// Identity, priority and submission time are fixed at construction.
pub struct Task<C> {
    id: TaskId,
    priority: Priority,
    submitted_at: Instant,
    submitted_wall: DateTime<Utc>,
    status: Arc<TaskStatus>,
    body: Option<TaskBody<C>>,
}

impl<C> Task<C> {
    pub fn new<F>(priority: Priority, body: F) -> Self
    where
        F: FnOnce(&C) -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            priority,
            submitted_at: Instant::now(),
            submitted_wall: Utc::now(),
            status: Arc::new(TaskStatus::new()),
            body: Some(Box::new(body)),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    /// Wall-clock submission time, for diagnostics.
    pub fn submitted_wall(&self) -> DateTime<Utc> {
        self.submitted_wall
    }

    pub fn state(&self) -> TaskState {
        self.status.lock().state
    }

    /// Observer handle that outlives the task.
    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            id: self.id,
            priority: self.priority,
            status: Arc::clone(&self.status),
        }
    }

    /// Time spent waiting since submission.
    pub fn waited(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.submitted_at)
    }

    pub fn score(&self, now: Instant) -> f64 {
        score(
            self.priority,
            self.waited(now),
            self.submitted_wall.timestamp_subsec_micros(),
        )
    }

    /// True once the task has waited strictly longer than `budget`.
    pub fn is_expired(&self, now: Instant, budget: Duration) -> bool {
        self.waited(now) > budget
    }

    /// Run the body against `ctx`, converting an error or panic into `Failed`.
    ///
    /// A second call is a no-op returning the current state.
    pub fn execute(&mut self, ctx: &C) -> TaskState {
        let Some(body) = self.body.take() else {
            return self.state();
        };

        self.status.advance(TaskState::Running);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(ctx)));

        let state = match outcome {
            Ok(Ok(())) => TaskState::Completed,
            Ok(Err(e)) => {
                error!(
                    task_id = self.id,
                    priority = %self.priority,
                    error = %format!("{e:#}"),
                    "Task failed"
                );
                TaskState::Failed
            }
            Err(payload) => {
                error!(
                    task_id = self.id,
                    priority = %self.priority,
                    panic = %panic_message(payload.as_ref()),
                    "Task panicked"
                );
                TaskState::Failed
            }
        };
        self.status.advance(state);
        state
    }

    /// Shift the submission time into the past.
    #[cfg(test)]
    pub(crate) fn backdate(mut self, by: Duration) -> Self {
        if let Some(earlier) = self.submitted_at.checked_sub(by) {
            self.submitted_at = earlier;
        }
        self
    }
}

impl<C> Drop for Task<C> {
    fn drop(&mut self) {
        let mut inner = self.status.lock();
        if inner.state == TaskState::Pending {
            inner.dropped = true;
            drop(inner);
            self.status.changed.notify_all();
        }
    }
}

impl<C> fmt::Debug for Task<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("submitted_wall", &self.submitted_wall)
            .field("state", &self.state())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ── TaskHandle ────────────────────────────────────────────────

/// Producer-side view of a submitted task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    priority: Priority,
    status: Arc<TaskStatus>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn state(&self) -> TaskState {
        self.status.lock().state
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// The task was discarded without running (expired at dequeue, or
    /// still queued when its queue was torn down).
    pub fn is_dropped(&self) -> bool {
        self.status.lock().dropped
    }

    /// Block until the task finishes or is dropped.
    ///
    /// Returns `None` on timeout, `Some(Completed | Failed)` once finished,
    /// and `Some(Pending)` if the task was dropped without running.
    pub fn wait(&self, timeout: Duration) -> Option<TaskState> {
        let guard = self.status.lock();
        let (guard, result) = self
            .status
            .changed
            .wait_timeout_while(guard, timeout, |s| !s.state.is_terminal() && !s.dropped)
            .unwrap_or_else(|e| e.into_inner());
        if result.timed_out() && !guard.state.is_terminal() && !guard.dropped {
            return None;
        }
        Some(guard.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn ids_increase() {
        let a: Task<()> = Task::new(Priority::Low, |_| Ok(()));
        let b: Task<()> = Task::new(Priority::Low, |_| Ok(()));
        assert!(b.id() > a.id());
    }

    #[test]
    fn score_priority_dominates_aging() {
        // A Low task that waited an hour still trails a fresh Normal task.
        let low = score(Priority::Low, Duration::from_secs(3600), 0);
        let normal = score(Priority::Normal, Duration::ZERO, 999_999);
        assert!(normal > low);
    }

    #[test]
    fn score_aging_rates() {
        let t = Duration::from_secs(10);
        assert_eq!(score(Priority::Critical, t, 0), 4_000_000.0);
        assert_eq!(score(Priority::High, t, 0), 3_000_010.0);
        assert_eq!(score(Priority::Normal, t, 0), 2_000_020.0);
        assert_eq!(score(Priority::Low, t, 0), 1_000_050.0);
    }

    #[test]
    fn score_uses_whole_seconds() {
        let a = score(Priority::Low, Duration::from_millis(1999), 0);
        let b = score(Priority::Low, Duration::from_secs(1), 0);
        assert_eq!(a, b);
    }

    #[test]
    fn score_tie_break_prefers_earlier() {
        let earlier = score(Priority::High, Duration::ZERO, 100);
        let later = score(Priority::High, Duration::ZERO, 200);
        assert!(earlier > later);
    }

    #[test]
    fn expiry_is_strict() {
        let task: Task<()> = Task::new(Priority::Low, |_| Ok(()));
        let at = task.submitted_at();
        assert!(!task.is_expired(at + Duration::from_millis(200), Duration::from_millis(200)));
        assert!(task.is_expired(at + Duration::from_millis(201), Duration::from_millis(200)));
    }

    #[test]
    fn execute_completes_once() {
        let runs = AtomicUsize::new(0);
        let mut task: Task<AtomicUsize> = Task::new(Priority::Normal, |ctx: &AtomicUsize| {
            ctx.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let handle = task.handle();
        assert_eq!(handle.state(), TaskState::Pending);

        assert_eq!(task.execute(&runs), TaskState::Completed);
        assert_eq!(task.execute(&runs), TaskState::Completed);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(handle.is_finished());
        assert!(!handle.is_dropped());
    }

    #[test]
    fn execute_error_marks_failed() {
        let mut task: Task<()> = Task::new(Priority::High, |_| anyhow::bail!("downstream refused"));
        assert_eq!(task.execute(&()), TaskState::Failed);
        assert_eq!(task.state(), TaskState::Failed);
    }

    #[test]
    fn execute_panic_marks_failed() {
        let mut task: Task<()> = Task::new(Priority::High, |_| panic!("boom"));
        assert_eq!(task.execute(&()), TaskState::Failed);
    }

    #[test]
    fn dropping_pending_task_marks_handle() {
        let task: Task<()> = Task::new(Priority::Low, |_| Ok(()));
        let handle = task.handle();
        drop(task);
        assert!(handle.is_dropped());
        assert_eq!(handle.wait(Duration::from_millis(10)), Some(TaskState::Pending));
    }

    #[test]
    fn wait_times_out_while_pending() {
        let task: Task<()> = Task::new(Priority::Low, |_| Ok(()));
        let handle = task.handle();
        assert_eq!(handle.wait(Duration::from_millis(20)), None);
        drop(task);
    }

    #[test]
    fn wait_observes_completion_from_another_thread() {
        let mut task: Task<()> = Task::new(Priority::Critical, |_| Ok(()));
        let handle = task.handle();
        let worker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            task.execute(&());
        });
        assert_eq!(handle.wait(Duration::from_secs(2)), Some(TaskState::Completed));
        worker.join().expect("worker panicked");
    }
}
