//! Core data model: physical identity, hardlink groups, and candidates.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Physical identity of a file: one key per on-disk object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileKey {
    /// Device id of the backing filesystem.
    pub device: u64,
    /// Inode number on that device.
    pub inode: u64,
}

/// One directory entry discovered under a mapping root.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Absolute path of the entry.
    pub path: PathBuf,
    /// Path relative to the mapping root; reused under the other root.
    pub rel_path: PathBuf,
    /// Size of the backing object in bytes.
    pub size: u64,
    /// Modification time of the backing object.
    pub mtime: DateTime<Utc>,
}

/// All names sharing one physical object under a single mapping root.
///
/// A group relocates atomically: either every name ends up at the
/// destination backed by one object, or the source is left fully intact.
#[derive(Debug, Clone)]
pub struct HardlinkGroup {
    /// Physical identity shared by every record.
    pub key: FileKey,
    /// Member names, sorted by path for determinism.
    pub records: Vec<FileRecord>,
}

impl HardlinkGroup {
    /// Number of names pointing at the physical object within this root.
    #[must_use]
    pub const fn link_count(&self) -> usize {
        self.records.len()
    }

    /// Size of the physical object (counted once, not per name).
    #[must_use]
    pub fn size(&self) -> u64 {
        self.records.first().map_or(0, |record| record.size)
    }

    /// Modification time of the newest name; gates the min-age floor.
    #[must_use]
    pub fn newest_mtime(&self) -> Option<DateTime<Utc>> {
        self.records.iter().map(|record| record.mtime).max()
    }

    /// Modification time of the oldest name; drives recency ordering and
    /// the max-age override.
    #[must_use]
    pub fn oldest_mtime(&self) -> Option<DateTime<Utc>> {
        self.records.iter().map(|record| record.mtime).min()
    }

    /// First member path, used to identify the group in logs and errors.
    #[must_use]
    pub fn first_path(&self) -> &Path {
        self.records
            .first()
            .map_or_else(|| Path::new(""), |record| record.path.as_path())
    }

    /// Iterate over the absolute paths of every member name.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.records.iter().map(|record| record.path.as_path())
    }
}

/// Watched status for a group after merging every media client's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchedState {
    /// No allow-listed user has watched any name.
    NotWatched,
    /// At least one allow-listed user watched a name.
    Watched,
    /// At least one media client could not answer this iteration.
    Unknown,
}

impl WatchedState {
    /// Collapse the tri-state for ordering: uncertainty sorts with watched,
    /// preferring under-eviction over disrupting something still in use.
    #[must_use]
    pub const fn sort_rank(self) -> u8 {
        match self {
            Self::NotWatched => 0,
            Self::Watched | Self::Unknown => 1,
        }
    }

    /// Merge answers from two sources; watched wins over unknown, unknown
    /// wins over not-watched.
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::Watched, _) | (_, Self::Watched) => Self::Watched,
            (Self::Unknown, _) | (_, Self::Unknown) => Self::Unknown,
            (Self::NotWatched, Self::NotWatched) => Self::NotWatched,
        }
    }
}

/// A hardlink group plus the derived keys the prioritizer orders by.
#[derive(Debug, Clone)]
pub struct EvictionCandidate {
    /// The group to relocate.
    pub group: HardlinkGroup,
    /// Whether the oldest name exceeded the max-age ceiling.
    pub forced: bool,
    /// Merged watched status across media clients.
    pub watched: WatchedState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(path: &str, size: u64, mtime_secs: i64) -> FileRecord {
        FileRecord {
            path: PathBuf::from(path),
            rel_path: PathBuf::from(path.trim_start_matches('/')),
            size,
            mtime: Utc.timestamp_opt(mtime_secs, 0).single().expect("valid timestamp"),
        }
    }

    #[test]
    fn group_derives_keys_from_members() {
        let group = HardlinkGroup {
            key: FileKey { device: 1, inode: 42 },
            records: vec![record("/a/x", 100, 1_000), record("/a/y", 100, 2_000)],
        };
        assert_eq!(group.link_count(), 2);
        assert_eq!(group.size(), 100);
        assert_eq!(group.oldest_mtime().map(|t| t.timestamp()), Some(1_000));
        assert_eq!(group.newest_mtime().map(|t| t.timestamp()), Some(2_000));
    }

    #[test]
    fn unknown_collapses_to_watched_rank() {
        assert_eq!(WatchedState::NotWatched.sort_rank(), 0);
        assert_eq!(WatchedState::Watched.sort_rank(), 1);
        assert_eq!(WatchedState::Unknown.sort_rank(), 1);
    }

    #[test]
    fn merge_prefers_certainty_of_watched() {
        assert_eq!(
            WatchedState::Unknown.merge(WatchedState::Watched),
            WatchedState::Watched
        );
        assert_eq!(
            WatchedState::NotWatched.merge(WatchedState::Unknown),
            WatchedState::Unknown
        );
        assert_eq!(
            WatchedState::NotWatched.merge(WatchedState::NotWatched),
            WatchedState::NotWatched
        );
    }
}
