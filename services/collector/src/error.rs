use thiserror::Error;

use crate::database::DbError;

/// Top-level error type for collector components. A single bad request
/// never surfaces this — handlers catch their own errors and reply with a
/// `Status::Error` envelope instead (`source/MonitorDevice.cpp`'s per-action
/// error handling). This type is reserved for failures that abort an entire
/// worker or the process: startup failures, a channel that has closed.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] tkm_protocol::FrameError),
    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("worker channel closed unexpectedly: {0}")]
    ChannelClosed(&'static str),
}

/// Process exit codes, matching `spec.md` §6.
pub mod exit_code {
    pub const OK: i32 = 0;
    pub const STARTUP_FAILURE: i32 = 1;
}
