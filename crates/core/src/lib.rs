pub mod config;
pub mod context;
pub mod error;

pub use config::{ExpiryConfig, FrameConfig, LoggingConfig, SchedulerConfig};
pub use context::{ContextSummary, ResponseRecord, TransferContext};
pub use error::*;
