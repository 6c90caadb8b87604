use thiserror::Error;

/// Errors raised while configuring or starting the scheduler.
///
/// Task bodies report their own failures through `anyhow`; a refused
/// submission is a `RejectReason`, not an error.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("failed to spawn worker: {0}")]
    Spawn(String),
}

pub type Result<T> = std::result::Result<T, FrameError>;
