//! Volume usage accounting for threshold decisions.

use std::path::{Path, PathBuf};

use nix::sys::statvfs::statvfs;
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// Point-in-time usage of the volume backing a mapping root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageSnapshot {
    /// Total capacity of the volume in bytes.
    pub total: u64,
    /// Bytes currently in use.
    pub used: u64,
}

impl UsageSnapshot {
    /// Used fraction of the volume as a percentage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent_used(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.used as f64 / self.total as f64 * 100.0
    }

    /// Bytes that must be freed to bring usage down to `threshold` percent.
    ///
    /// Zero when usage is already at or below the threshold.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn bytes_above(&self, threshold: f64) -> u64 {
        let target = (self.total as f64 * threshold / 100.0) as u64;
        self.used.saturating_sub(target)
    }

    /// Bytes available before usage reaches `threshold` percent.
    ///
    /// Zero when usage is already at or above the threshold.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn bytes_below(&self, threshold: f64) -> u64 {
        let target = (self.total as f64 * threshold / 100.0) as u64;
        target.saturating_sub(self.used)
    }
}

/// Source of usage snapshots; mockable for the controller's tests.
pub trait UsageProbe: Send + Sync {
    /// Sample the volume containing `path`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Usage`] when the sample cannot be taken.
    fn sample(&self, path: &Path) -> EngineResult<UsageSnapshot>;
}

/// [`UsageProbe`] backed by `statvfs(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatvfsProbe;

impl UsageProbe for StatvfsProbe {
    fn sample(&self, path: &Path) -> EngineResult<UsageSnapshot> {
        let stat = statvfs(path).map_err(|source| EngineError::Usage {
            path: PathBuf::from(path),
            source,
        })?;
        let fragment = stat.fragment_size();
        let total = stat.blocks() * fragment;
        let used = (stat.blocks() - stat.blocks_free()) * fragment;
        let snapshot = UsageSnapshot { total, used };
        debug!(
            path = %path.display(),
            total,
            used,
            percent = format_args!("{:.2}", snapshot.percent_used()),
            "usage sampled"
        );
        Ok(snapshot)
    }
}
