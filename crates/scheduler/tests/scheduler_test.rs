//! End-to-end tests for admission control, expiry, ordering and shutdown
//! across the queue, the worker pool and the scheduler facade.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use frame_core::{ExpiryConfig, SchedulerConfig, TransferContext, ResponseRecord};
use frame_scheduler::{
    ExpiryBudgets, Priority, PriorityTaskQueue, RejectReason, Scheduler, Task, TaskState,
};

const SHORT: Duration = Duration::from_millis(20);
const TIMEOUT: Duration = Duration::from_secs(5);

fn noop(priority: Priority) -> Task<()> {
    Task::new(priority, |_| Ok(()))
}

fn generous_expiry() -> ExpiryConfig {
    ExpiryConfig {
        critical_ms: 60_000,
        high_ms: 60_000,
        normal_ms: 60_000,
        low_ms: 60_000,
    }
}

// ── Admission ───────────────────────────────────────────────

#[test]
fn capacity_two_admission_scenario() {
    let q: PriorityTaskQueue<()> = PriorityTaskQueue::new(2, 1.2, ExpiryBudgets::default());

    q.push(noop(Priority::Low)).unwrap();
    q.push(noop(Priority::Low)).unwrap();
    let third = q.push(noop(Priority::Low)).unwrap_err();
    assert!(matches!(third.reason, RejectReason::QueueFull { .. }));

    assert!(q.pop(Some(SHORT)).is_some());
    assert_eq!(q.size(), 1);

    // Back at capacity with below-High work.
    q.push(noop(Priority::Low)).unwrap();
    assert_eq!(q.size(), 2);

    // High is admitted past capacity because 2 < 2 * 1.2.
    let high = noop(Priority::High);
    let high_id = high.id();
    q.push(high).unwrap();
    assert_eq!(q.size(), 3);

    // 3 >= 2.4: even Critical is refused now.
    assert!(matches!(
        q.push(noop(Priority::Critical)).unwrap_err().reason,
        RejectReason::HardCeiling { .. }
    ));

    // The High task comes out first despite being submitted last.
    assert_eq!(q.pop(Some(SHORT)).map(|t| t.id()), Some(high_id));
}

#[test]
fn concurrent_producers_respect_ceiling() {
    let q: Arc<PriorityTaskQueue<()>> =
        Arc::new(PriorityTaskQueue::new(50, 1.2, ExpiryBudgets::default()));
    let producers = 8;
    let barrier = Arc::new(Barrier::new(producers));

    let handles: Vec<_> = (0..producers)
        .map(|i| {
            let q = Arc::clone(&q);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for n in 0..50 {
                    let _ = q.push(noop(Priority::ALL[(i + n) % 4]));
                    assert!(q.size() as f64 <= 50.0 * 1.2);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("producer panicked");
    }

    let stats = q.stats();
    assert!(stats.depth <= 60);
    assert_eq!(stats.admitted + stats.rejected, 400);
    assert_eq!(stats.by_priority.values().sum::<usize>(), stats.depth);
    // Below-High work never pushed the depth past capacity on its own.
    assert!(stats.by_priority[&Priority::Low] + stats.by_priority[&Priority::Normal] <= 50);
}

// ── Ordering ────────────────────────────────────────────────

#[test]
fn consecutive_pops_are_score_ordered() {
    let q: PriorityTaskQueue<()> = PriorityTaskQueue::new(100, 1.2, ExpiryBudgets::default());
    for i in 0..40 {
        q.push(noop(Priority::ALL[(i * 7) % 4])).unwrap();
    }

    let mut last: Option<Priority> = None;
    while let Some(task) = q.pop(Some(SHORT)) {
        if let Some(prev) = last {
            assert!(task.priority() <= prev, "{:?} popped after {:?}", task.priority(), prev);
        }
        last = Some(task.priority());
    }
}

// ── Expiry ──────────────────────────────────────────────────

#[test]
fn stale_low_task_is_discarded_and_pop_keeps_waiting() {
    let q: Arc<PriorityTaskQueue<()>> =
        Arc::new(PriorityTaskQueue::new(10, 1.2, ExpiryBudgets::default()));
    let stale = noop(Priority::Low);
    let stale_handle = stale.handle();
    q.push(stale).unwrap();

    thread::sleep(Duration::from_millis(300));

    let (tx, rx) = mpsc::channel();
    let consumer = {
        let q = Arc::clone(&q);
        thread::spawn(move || {
            // Zero timeout blocks indefinitely.
            let task = q.pop(Some(Duration::ZERO));
            tx.send(task.map(|t| t.id())).expect("send");
        })
    };

    // The stale task must not be handed out; the consumer keeps blocking.
    assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());
    assert!(stale_handle.is_dropped());
    assert_eq!(q.stats().expired, 1);

    let fresh = noop(Priority::Normal);
    let fresh_id = fresh.id();
    q.push(fresh).unwrap();

    assert_eq!(rx.recv_timeout(TIMEOUT).expect("consumer woke"), Some(fresh_id));
    consumer.join().expect("consumer panicked");
}

// ── Shutdown ────────────────────────────────────────────────

#[test]
fn stop_unblocks_every_pop_and_refuses_pushes() {
    let q: Arc<PriorityTaskQueue<()>> =
        Arc::new(PriorityTaskQueue::new(10, 1.2, ExpiryBudgets::default()));
    let (tx, rx) = mpsc::channel();

    let consumers: Vec<_> = (0..4)
        .map(|_| {
            let q = Arc::clone(&q);
            let tx = tx.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let task = q.pop(None);
                tx.send((task.is_none(), start.elapsed())).expect("send");
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(50));
    q.stop();

    for _ in 0..4 {
        let (empty, _) = rx.recv_timeout(Duration::from_secs(1)).expect("pop returned");
        assert!(empty);
    }
    for consumer in consumers {
        consumer.join().expect("consumer panicked");
    }

    for p in Priority::ALL {
        assert_eq!(q.push(noop(p)).unwrap_err().reason, RejectReason::Stopped);
    }
}

#[test]
fn scheduler_stop_twice_is_noop() {
    let config = SchedulerConfig {
        worker_threads: 2,
        poll_timeout_ms: 50,
        ..SchedulerConfig::default()
    };
    let scheduler = Scheduler::start(config, Arc::new(())).unwrap();
    let handle = scheduler.submit(Priority::High, |_| Ok(())).unwrap();
    assert_eq!(handle.wait(TIMEOUT), Some(TaskState::Completed));

    scheduler.stop();
    let after_first = scheduler.snapshot();
    scheduler.stop();
    let after_second = scheduler.snapshot();

    assert_eq!(after_first.completed_tasks, after_second.completed_tasks);
    assert_eq!(after_first.failed_tasks, after_second.failed_tasks);
    assert!(after_second.pool_stopped);
}

// ── Full pipeline ───────────────────────────────────────────

#[test]
fn producers_and_workers_share_transfer_context() {
    let config = SchedulerConfig {
        queue_capacity: 10_000,
        worker_threads: 4,
        poll_timeout_ms: 20,
        expiry: generous_expiry(),
        ..SchedulerConfig::default()
    };
    let scheduler = Arc::new(Scheduler::start(config, Arc::new(TransferContext::new())).unwrap());
    let failures = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..4)
        .map(|i| {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || {
                let mut handles = Vec::new();
                for n in 0..50 {
                    let priority = Priority::ALL[(i + n) % 4];
                    let handle = scheduler
                        .submit(priority, move |ctx: &TransferContext| {
                            let mut record = ResponseRecord::new(format!("producer-{i}"));
                            record.total_bytes = 100;
                            record.transferred_bytes = 100;
                            record.finish();
                            ctx.record(record);
                            if n % 10 == 9 {
                                anyhow::bail!("simulated downstream failure");
                            }
                            Ok(())
                        })
                        .expect("capacity is large enough");
                    handles.push(handle);
                }
                handles
            })
        })
        .collect();

    let handles: Vec<_> = producers
        .into_iter()
        .flat_map(|p| p.join().expect("producer panicked"))
        .collect();

    for handle in &handles {
        let state = handle.wait(TIMEOUT).expect("task finished");
        if state == TaskState::Failed {
            failures.fetch_add(1, Ordering::SeqCst);
        }
    }
    assert!(scheduler.wait_idle(TIMEOUT));
    scheduler.stop();

    let snapshot = scheduler.snapshot();
    assert_eq!(snapshot.completed_tasks, 200);
    assert_eq!(snapshot.failed_tasks, 20);
    assert_eq!(failures.load(Ordering::SeqCst), 20);
    assert_eq!(snapshot.queue.expired, 0);
    assert_eq!(snapshot.metrics.total_executed(), 200);

    let summary = scheduler.context().summary();
    assert_eq!(summary.requests, 200);
    assert_eq!(summary.finished, 200);
}
