mod cli;
mod load;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use frame_core::{FrameConfig, TransferContext};
use frame_scheduler::Scheduler;

use crate::cli::CliArgs;
use crate::load::LoadPlan;

fn main() -> Result<()> {
    frame_core::config::load_dotenv();
    let args = CliArgs::parse();

    // Load config
    let mut config = FrameConfig::load(Some(&args.config))
        .with_context(|| format!("failed to load configuration from {}", args.config.display()))?;
    if let Some(workers) = args.workers {
        config.scheduler.worker_threads = workers;
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with_target(false)
        .with_ansi(config.logging.ansi)
        .init();

    // Handle --print-config
    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config.summary())?);
        return Ok(());
    }

    config.log_summary();

    let context = Arc::new(TransferContext::new());
    let scheduler = Scheduler::start(config.scheduler.clone(), Arc::clone(&context))
        .context("failed to start scheduler")?;

    let plan = LoadPlan {
        tasks: args.tasks,
        work: Duration::from_millis(args.work_ms),
        fail_every: args.fail_every,
    };
    let report = load::run(&scheduler, &plan);
    info!(
        submitted = report.submitted,
        admitted = report.admitted,
        "Workload submitted"
    );

    let drained = scheduler.wait_idle(Duration::from_secs(args.drain_timeout_secs));
    if !drained {
        warn!(
            remaining = scheduler.queue_depth(),
            "Drain timed out, stopping with work still queued"
        );
    }
    scheduler.stop();

    let output = serde_json::json!({
        "load": report,
        "drained": drained,
        "scheduler": scheduler.snapshot(),
        "context": context.summary(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
