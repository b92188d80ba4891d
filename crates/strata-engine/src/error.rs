//! # Design
//!
//! - One variant per taxonomy tier so callers can route recovery: scan
//!   failures skip a subtree, client failures degrade to unknown, move
//!   failures roll back one candidate, mapping-fatal failures abort one
//!   mapping.
//! - Constant messages with context fields; source errors preserved.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors produced by the eviction engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Traversal of a subtree failed; the subtree is skipped.
    #[error("scan failure")]
    Scan {
        /// Path where traversal failed.
        path: PathBuf,
        /// Underlying walkdir error.
        source: walkdir::Error,
    },
    /// An ignore glob pattern failed to compile.
    #[error("ignore glob failure")]
    Glob {
        /// Offending pattern.
        pattern: String,
        /// Underlying globset error.
        source: globset::Error,
    },
    /// Filesystem IO failed.
    #[error("engine io failure")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Volume-level usage accounting failed.
    #[error("usage probe failure")]
    Usage {
        /// Root the probe was asked about.
        path: PathBuf,
        /// Underlying errno.
        source: nix::Error,
    },
    /// Relocating one hardlink group failed; destination side rolled back.
    #[error("move failure")]
    Move {
        /// First name of the group that failed to move.
        group: PathBuf,
        /// Operation that failed.
        operation: &'static str,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Post-move verification found a mismatch; destination side rolled back.
    #[error("move verification mismatch")]
    Verify {
        /// First name of the group that failed verification.
        group: PathBuf,
        /// Static description of the mismatch.
        detail: &'static str,
    },
    /// A mapping root is unusable; the mapping aborts, others proceed.
    #[error("mapping root inaccessible")]
    MappingFatal {
        /// The unusable root.
        root: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
}

impl EngineError {
    pub(crate) fn moving(
        group: impl Into<PathBuf>,
        operation: &'static str,
        source: io::Error,
    ) -> Self {
        Self::Move {
            group: group.into(),
            operation,
            source,
        }
    }
}
