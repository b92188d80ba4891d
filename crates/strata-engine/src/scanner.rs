//! Filesystem walk, ignore filtering, and hardlink grouping.
//!
//! # Design
//! - Grouping key is physical identity (device + inode), never path; two
//!   names with matching keys under one root always collapse into one group.
//! - An ignore glob excludes the matching path and, for directories, the
//!   whole subtree beneath it; excluded files never become candidates.
//! - Symbolic links are not hardlinks and are skipped outright.
//! - A single unreadable subtree is logged and skipped; an unreadable root
//!   aborts the mapping.

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{EngineError, EngineResult};
use crate::model::{FileKey, FileRecord, HardlinkGroup};

/// Compile the mapping's ignore patterns into a matcher.
///
/// # Errors
///
/// Returns [`EngineError::Glob`] for a pattern that fails to compile.
pub fn build_ignore_set(patterns: &[String]) -> EngineResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).map_err(|source| EngineError::Glob {
            pattern: pattern.clone(),
            source,
        })?);
    }
    builder.build().map_err(|source| EngineError::Glob {
        pattern: String::new(),
        source,
    })
}

fn is_ignored(ignore: &GlobSet, root: &Path, path: &Path) -> bool {
    if ignore.is_empty() {
        return false;
    }
    // Patterns may be written against either the absolute path or the
    // path relative to the mapping root.
    ignore.is_match(path)
        || path
            .strip_prefix(root)
            .is_ok_and(|rel| ignore.is_match(rel))
}

/// Walk `root` and produce its hardlink groups, sorted by first path.
///
/// # Errors
///
/// Returns [`EngineError::MappingFatal`] when the root itself is unreadable.
pub fn scan_groups(root: &Path, ignore: &GlobSet) -> EngineResult<Vec<HardlinkGroup>> {
    let mut grouped: BTreeMap<FileKey, Vec<FileRecord>> = BTreeMap::new();
    let mut skipped = 0usize;

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_ignored(ignore, root, entry.path()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                if error.depth() == 0 {
                    let source = error
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("walk aborted"));
                    return Err(EngineError::MappingFatal {
                        root: root.to_path_buf(),
                        source,
                    });
                }
                let skip = EngineError::Scan {
                    path: error.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf),
                    source: error,
                };
                warn!(root = %root.display(), error = %skip, "skipping unreadable subtree");
                skipped += 1;
                continue;
            }
        };

        if entry.file_type().is_symlink() {
            debug!(path = %entry.path().display(), "skipping symlink");
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(error) => {
                warn!(path = %entry.path().display(), error = %error, "skipping unreadable file");
                skipped += 1;
                continue;
            }
        };

        let key = FileKey {
            device: metadata.dev(),
            inode: metadata.ino(),
        };
        let mtime = match metadata.modified() {
            Ok(modified) => DateTime::<Utc>::from(modified),
            Err(error) => {
                warn!(path = %entry.path().display(), error = %error, "skipping file without a readable mtime");
                skipped += 1;
                continue;
            }
        };
        let rel_path = entry
            .path()
            .strip_prefix(root)
            .map_or_else(|_| entry.path().to_path_buf(), Path::to_path_buf);

        grouped.entry(key).or_default().push(FileRecord {
            path: entry.path().to_path_buf(),
            rel_path,
            size: metadata.len(),
            mtime,
        });
    }

    let mut groups: Vec<HardlinkGroup> = grouped
        .into_iter()
        .map(|(key, mut records)| {
            records.sort_by(|a, b| a.path.cmp(&b.path));
            HardlinkGroup { key, records }
        })
        .collect();
    groups.sort_by(|a, b| a.first_path().cmp(b.first_path()));

    info!(
        root = %root.display(),
        groups = groups.len(),
        names = groups.iter().map(HardlinkGroup::link_count).sum::<usize>(),
        skipped,
        "scan complete"
    );
    Ok(groups)
}

/// Remove directories left empty under `root` after a move pass.
///
/// Ignore-matched subtrees and the root itself are never removed. Returns
/// the number of directories pruned.
///
/// # Errors
///
/// Returns [`EngineError::MappingFatal`] when the root itself is unreadable.
pub fn prune_empty_dirs(root: &Path, ignore: &GlobSet) -> EngineResult<usize> {
    let mut directories: Vec<(usize, PathBuf)> = Vec::new();
    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_ignored(ignore, root, entry.path()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                if error.depth() == 0 {
                    let source = error
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("walk aborted"));
                    return Err(EngineError::MappingFatal {
                        root: root.to_path_buf(),
                        source,
                    });
                }
                continue;
            }
        };
        if entry.depth() > 0 && entry.file_type().is_dir() {
            directories.push((entry.depth(), entry.path().to_path_buf()));
        }
    }

    // Deepest first so a chain of empty parents collapses in one pass.
    directories.sort_by(|a, b| b.0.cmp(&a.0));

    let mut removed = 0usize;
    for (_, dir) in directories {
        let is_empty = fs::read_dir(&dir).is_ok_and(|mut entries| entries.next().is_none());
        if is_empty && fs::remove_dir(&dir).is_ok() {
            debug!(dir = %dir.display(), "pruned empty directory");
            removed += 1;
        }
    }
    Ok(removed)
}
