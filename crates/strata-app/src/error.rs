//! # Design
//!
//! - Centralize application-level errors for startup and orchestration.
//! - Keep error messages constant while carrying context fields.
//! - Any error surfacing from `run` means the run never usefully started
//!   (lock contention, unusable configuration); exit code 2. A mapping that
//!   reaches its failed phase is reported, not raised.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Another live engine instance holds the lock file.
    #[error("another instance is running")]
    LockHeld {
        /// Lock file path.
        path: PathBuf,
        /// PID of the live holder.
        pid: i32,
    },
    /// Lock file maintenance failed.
    #[error("lock file operation failed")]
    LockIo {
        /// Operation identifier.
        operation: &'static str,
        /// Lock file path.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Application-level filesystem IO failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Configuration loading failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: strata_config::ConfigError,
    },
    /// Client construction failed.
    #[error("client construction failed")]
    Client {
        /// Operation identifier.
        operation: &'static str,
        /// Source client error.
        source: strata_clients::ClientError,
    },
    /// Engine setup failed before the mapping loop could start.
    #[error("engine setup failed")]
    Engine {
        /// Operation identifier.
        operation: &'static str,
        /// Source engine error.
        source: strata_engine::EngineError,
    },
}

impl AppError {
    pub(crate) fn lock_io(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: io::Error,
    ) -> Self {
        Self::LockIo {
            operation,
            path: path.into(),
            source,
        }
    }
}
