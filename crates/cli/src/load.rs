//! Synthetic workload: mixed-priority tasks that record a transfer into
//! the shared context.

use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use frame_core::{ResponseRecord, TransferContext};
use frame_scheduler::{Priority, RejectReason, Scheduler};
use serde::Serialize;
use tracing::debug;

/// Bytes "transferred" by each synthetic task.
const TRANSFER_BYTES: u64 = 4096;
/// Progress updates per task.
const CHUNKS: u64 = 4;

#[derive(Debug, Clone)]
pub struct LoadPlan {
    pub tasks: usize,
    pub work: Duration,
    /// Every Nth task fails; 0 disables failures.
    pub fail_every: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct LoadReport {
    pub submitted: usize,
    pub admitted: usize,
    pub rejected: BTreeMap<String, usize>,
}

/// Deterministic mix per 10 tasks: 1 critical, 2 high, 3 normal, 4 low.
pub fn priority_for(n: usize) -> Priority {
    match n % 10 {
        0 => Priority::Critical,
        1 | 2 => Priority::High,
        3..=5 => Priority::Normal,
        _ => Priority::Low,
    }
}

fn reject_label(reason: &RejectReason) -> &'static str {
    match reason {
        RejectReason::Stopped => "stopped",
        RejectReason::QueueFull { .. } => "queue_full",
        RejectReason::HardCeiling { .. } => "hard_ceiling",
    }
}

/// Submit every task in `plan` without waiting for them.
pub fn run(scheduler: &Scheduler<TransferContext>, plan: &LoadPlan) -> LoadReport {
    let mut report = LoadReport::default();

    for n in 0..plan.tasks {
        let priority = priority_for(n);
        let work = plan.work;
        let fail = plan.fail_every > 0 && (n + 1) % plan.fail_every == 0;

        report.submitted += 1;
        let submitted = scheduler.submit(priority, move |ctx: &TransferContext| {
            let mut record = ResponseRecord::new(format!("synthetic/{priority}"));
            record.total_bytes = TRANSFER_BYTES;
            record.custom_data = Some(format!("task #{n}"));
            let id = ctx.record(record);

            for _ in 0..CHUNKS {
                thread::sleep(work / CHUNKS as u32);
                ctx.update(&id, |r| r.transferred_bytes += TRANSFER_BYTES / CHUNKS);
            }
            ctx.update(&id, |r| r.finish());

            if fail {
                anyhow::bail!("synthetic failure for task #{n}");
            }
            Ok(())
        });

        match submitted {
            Ok(handle) => {
                report.admitted += 1;
                debug!(task_id = handle.id(), %priority, "Submitted");
            }
            Err(reason) => {
                *report
                    .rejected
                    .entry(reject_label(&reason).to_string())
                    .or_default() += 1;
            }
        }
    }

    report
}
