use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FrameError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

// ── Top-level config ──────────────────────────────────────────

/// Full configuration, parsed from `frame.toml` with environment overrides.
///
/// Read once at startup and handed to the scheduler by value; nothing in
/// the scheduler re-reads it afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ── Scheduler ─────────────────────────────────────────────────

/// Queue and worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Soft capacity: below-High tasks are refused at or above this depth.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Hard ceiling multiplier applied to `queue_capacity` for High and Critical.
    #[serde(default = "default_overflow_ratio")]
    pub overflow_ratio: f64,
    /// Number of worker threads. 0 = available parallelism.
    #[serde(default)]
    pub worker_threads: usize,
    /// How long an idle worker blocks in `pop` before re-checking the stop flag.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    /// Per-priority wait budgets.
    #[serde(default)]
    pub expiry: ExpiryConfig,
}

fn default_queue_capacity() -> usize { 1000 }
fn default_overflow_ratio() -> f64 { 1.2 }
fn default_poll_timeout_ms() -> u64 { 1000 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            overflow_ratio: default_overflow_ratio(),
            worker_threads: 0,
            poll_timeout_ms: default_poll_timeout_ms(),
            expiry: ExpiryConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Resolve worker thread count (0 means use available parallelism).
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.worker_threads
        }
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), FrameError> {
        if self.queue_capacity == 0 {
            return Err(FrameError::Config("scheduler.queue_capacity must be > 0".into()));
        }
        if !(self.overflow_ratio >= 1.0) {
            return Err(FrameError::Config(format!(
                "scheduler.overflow_ratio must be >= 1.0, got {}",
                self.overflow_ratio
            )));
        }
        if self.poll_timeout_ms == 0 {
            return Err(FrameError::Config("scheduler.poll_timeout_ms must be > 0".into()));
        }
        let e = &self.expiry;
        for (name, ms) in [
            ("critical_ms", e.critical_ms),
            ("high_ms", e.high_ms),
            ("normal_ms", e.normal_ms),
            ("low_ms", e.low_ms),
        ] {
            if ms == 0 {
                return Err(FrameError::Config(format!(
                    "scheduler.expiry.{name} must be > 0"
                )));
            }
        }
        Ok(())
    }
}

/// Maximum time a task may wait in the queue before it is shed, per priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryConfig {
    #[serde(default = "default_critical_ms")]
    pub critical_ms: u64,
    #[serde(default = "default_high_ms")]
    pub high_ms: u64,
    #[serde(default = "default_normal_ms")]
    pub normal_ms: u64,
    #[serde(default = "default_low_ms")]
    pub low_ms: u64,
}

fn default_critical_ms() -> u64 { 2000 }
fn default_high_ms() -> u64 { 1000 }
fn default_normal_ms() -> u64 { 500 }
fn default_low_ms() -> u64 { 200 }

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            critical_ms: default_critical_ms(),
            high_ms: default_high_ms(),
            normal_ms: default_normal_ms(),
            low_ms: default_low_ms(),
        }
    }
}

// ── Logging ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Colored console output.
    #[serde(default = "default_ansi")]
    pub ansi: bool,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_ansi() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            ansi: default_ansi(),
        }
    }
}

// ── Loading & Validation ──────────────────────────────────────

impl FrameConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, FrameError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FrameError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Load from `path` if given and present, otherwise fall back to defaults
    /// (environment overrides still apply).
    pub fn load(path: Option<&Path>) -> Result<Self, FrameError> {
        match path {
            Some(p) if p.exists() => {
                tracing::debug!(path = %p.display(), "Loading config");
                Self::from_file(p)
            }
            Some(p) => {
                tracing::debug!(path = %p.display(), "Config file not found, using defaults");
                Self::from_toml("")
            }
            None => Self::from_toml(""),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// - `FRAME_QUEUE_CAPACITY` → `scheduler.queue_capacity`
    /// - `FRAME_OVERFLOW_RATIO` → `scheduler.overflow_ratio`
    /// - `FRAME_WORKER_THREADS` → `scheduler.worker_threads`
    /// - `FRAME_POLL_TIMEOUT_MS` → `scheduler.poll_timeout_ms`
    /// - `FRAME_LOG_LEVEL` → `logging.level`
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup. Unparseable values are ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FRAME_QUEUE_CAPACITY").and_then(|v| v.parse().ok()) {
            self.scheduler.queue_capacity = v;
        }
        if let Some(v) = lookup("FRAME_OVERFLOW_RATIO").and_then(|v| v.parse().ok()) {
            self.scheduler.overflow_ratio = v;
        }
        if let Some(v) = lookup("FRAME_WORKER_THREADS").and_then(|v| v.parse().ok()) {
            self.scheduler.worker_threads = v;
        }
        if let Some(v) = lookup("FRAME_POLL_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.scheduler.poll_timeout_ms = v;
        }
        if let Some(v) = lookup("FRAME_LOG_LEVEL").filter(|v| !v.is_empty()) {
            self.logging.level = v;
        }
    }

    pub fn validate(&self) -> Result<(), FrameError> {
        self.scheduler.validate()
    }

    /// Print the effective configuration for startup logs.
    pub fn log_summary(&self) {
        let s = &self.scheduler;
        tracing::info!("Config loaded:");
        tracing::info!(
            "  scheduler:  capacity={}, overflow_ratio={}, workers={}, poll={}ms",
            s.queue_capacity,
            s.overflow_ratio,
            s.resolved_worker_threads(),
            s.poll_timeout_ms
        );
        tracing::info!(
            "  expiry:     critical={}ms, high={}ms, normal={}ms, low={}ms",
            s.expiry.critical_ms,
            s.expiry.high_ms,
            s.expiry.normal_ms,
            s.expiry.low_ms
        );
        tracing::info!("  logging:    level={}", self.logging.level);
    }

    pub fn summary(&self) -> serde_json::Value {
        let s = &self.scheduler;
        serde_json::json!({
            "scheduler": {
                "queue_capacity": s.queue_capacity,
                "overflow_ratio": s.overflow_ratio,
                "worker_threads": s.resolved_worker_threads(),
                "poll_timeout_ms": s.poll_timeout_ms,
                "expiry": s.expiry,
            },
            "logging": { "level": self.logging.level },
        })
    }
}
