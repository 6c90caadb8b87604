use std::path::PathBuf;

use clap::Parser;

/// Drive a synthetic workload through the frame priority scheduler.
///
/// Submits a mixed-priority batch, waits for the workers to drain it,
/// stops the scheduler and prints a JSON report.
#[derive(Parser, Debug)]
#[command(name = "frame", version, about = "Priority task scheduler demo")]
pub struct CliArgs {
    /// Path to frame.toml config file (defaults apply if missing).
    #[arg(long, env = "FRAME_CONFIG", default_value = "config/frame.toml")]
    pub config: PathBuf,

    /// Worker thread override (0 = available parallelism).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Number of tasks to submit.
    #[arg(long, default_value_t = 200)]
    pub tasks: usize,

    /// Simulated work per task in milliseconds.
    #[arg(long, default_value_t = 5)]
    pub work_ms: u64,

    /// Make every Nth task fail (0 = never).
    #[arg(long, default_value_t = 0)]
    pub fail_every: usize,

    /// Seconds to wait for the queue to drain before stopping.
    #[arg(long, default_value_t = 30)]
    pub drain_timeout_secs: u64,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    pub print_config: bool,
}
