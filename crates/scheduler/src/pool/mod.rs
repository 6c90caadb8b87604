//! Fixed worker pool draining a [`PriorityTaskQueue`](crate::queue::PriorityTaskQueue).
//!
//! Split into focused submodules:
//! - `core`: WorkerPool struct, startup, shutdown and accessors
//! - `execution`: the per-worker loop and task execution bookkeeping

mod core;
mod execution;

pub use self::core::WorkerPool;
