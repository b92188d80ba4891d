//! Hardlink-preserving relocation of one group between the tier roots.
//!
//! # Design
//! - A group moves atomically: link or copy every name to the destination,
//!   verify physical identity there, and only then unlink the sources. Any
//!   failure before source removal rolls the destination side back.
//! - Same-device moves are pure link-and-unlink; the payload is never
//!   copied. Cross-device moves copy the payload once and hardlink the
//!   remaining names from the first destination name.
//! - Torrents referencing the group are paused before the first filesystem
//!   operation and resumed after the last, success or failure. Only
//!   torrents this executor paused are resumed.
//! - A destination name left behind by an interrupted run is reused when it
//!   already carries the group's payload and replaced otherwise, so a
//!   half-finished move resumes instead of failing on the leftover.

use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nix::sys::stat::utimes;
use nix::sys::time::TimeVal;
use nix::unistd::{Gid, Uid, chown};
use strata_clients::{TorrentRef, TorrentStateClient};
use tracing::{debug, info, warn};

use crate::enrich::Enrichment;
use crate::error::{EngineError, EngineResult};
use crate::model::{FileRecord, HardlinkGroup};

/// Executes group relocations with torrent coordination.
pub struct MoveExecutor {
    torrent_clients: Vec<Arc<dyn TorrentStateClient>>,
    dry_run: bool,
}

impl MoveExecutor {
    /// Build an executor over the configured torrent clients.
    #[must_use]
    pub const fn new(torrent_clients: Vec<Arc<dyn TorrentStateClient>>, dry_run: bool) -> Self {
        Self {
            torrent_clients,
            dry_run,
        }
    }

    /// Whether this executor only simulates moves.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Relocate every name of `group` from under `source_root` to the
    /// matching relative paths under `dest_root`.
    ///
    /// Returns the bytes freed on the source volume (the physical size,
    /// counted once regardless of name count).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Move`] or [`EngineError::Verify`] when the
    /// transfer fails; the destination side has been rolled back and the
    /// source is intact.
    pub async fn relocate(
        &self,
        group: &HardlinkGroup,
        dest_root: &Path,
        enrichment: &Enrichment,
    ) -> EngineResult<u64> {
        let references = enrichment.torrents_for(group.paths());

        if self.dry_run {
            info!(
                group = %group.first_path().display(),
                names = group.link_count(),
                bytes = group.size(),
                torrents = references.len(),
                "dry run: would relocate"
            );
            return Ok(group.size());
        }

        let paused = self.pause_all(&references).await;
        let result = transfer(group, dest_root);
        self.resume_all(&paused).await;

        let moved = result?;
        info!(
            group = %group.first_path().display(),
            names = group.link_count(),
            bytes = moved,
            dest = %dest_root.display(),
            "group relocated"
        );
        Ok(moved)
    }

    async fn pause_all(&self, references: &[TorrentRef]) -> Vec<TorrentRef> {
        let mut paused = Vec::new();
        for reference in references {
            let Some(client) = self.client_for(&reference.client) else {
                warn!(client = %reference.client, torrent = %reference.name, "no client for reference; not pausing");
                continue;
            };
            match client.pause(reference).await {
                Ok(()) => {
                    debug!(torrent = %reference.name, client = %reference.client, "torrent paused");
                    paused.push(reference.clone());
                }
                Err(error) => {
                    warn!(torrent = %reference.name, client = %reference.client, error = %error, "pause failed; moving anyway");
                }
            }
        }
        paused
    }

    async fn resume_all(&self, paused: &[TorrentRef]) {
        for reference in paused {
            let Some(client) = self.client_for(&reference.client) else {
                continue;
            };
            if let Err(error) = client.resume(reference).await {
                warn!(torrent = %reference.name, client = %reference.client, error = %error, "resume failed; torrent left paused");
            } else {
                debug!(torrent = %reference.name, client = %reference.client, "torrent resumed");
            }
        }
    }

    fn client_for(&self, label: &str) -> Option<&Arc<dyn TorrentStateClient>> {
        self.torrent_clients
            .iter()
            .find(|client| client.label() == label)
    }
}

fn transfer(group: &HardlinkGroup, dest_root: &Path) -> EngineResult<u64> {
    let first = group.first_path().to_path_buf();
    let destinations: Vec<PathBuf> = group
        .records
        .iter()
        .map(|record| dest_root.join(&record.rel_path))
        .collect();

    let dest_meta = fs::metadata(dest_root)
        .map_err(|source| EngineError::moving(&first, "stat destination root", source))?;
    let same_device = dest_meta.dev() == group.key.device;

    let mut created: Vec<PathBuf> = Vec::new();
    if let Err(error) = place_names(group, &destinations, same_device, &mut created) {
        rollback(&created);
        return Err(error);
    }

    if let Err(error) = verify(group, &destinations, same_device) {
        rollback(&created);
        return Err(error);
    }

    // Point of no return: identity verified at the destination, so losing
    // a source unlink costs duplicate space, never data.
    for record in &group.records {
        if let Err(error) = fs::remove_file(&record.path) {
            warn!(path = %record.path.display(), error = %error, "source unlink failed; duplicate remains");
        }
    }
    Ok(group.size())
}

fn place_names(
    group: &HardlinkGroup,
    destinations: &[PathBuf],
    same_device: bool,
    created: &mut Vec<PathBuf>,
) -> EngineResult<()> {
    let first = group.first_path().to_path_buf();

    for destination in destinations {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| EngineError::moving(&first, "create parent", source))?;
        }
    }

    if same_device {
        for (record, destination) in group.records.iter().zip(destinations) {
            if leftover_matches(&first, destination, |existing| {
                existing.dev() == group.key.device && existing.ino() == group.key.inode
            })? {
                continue;
            }
            fs::hard_link(&record.path, destination)
                .map_err(|source| EngineError::moving(&first, "link", source))?;
            created.push(destination.clone());
        }
        return Ok(());
    }

    let anchor = &destinations[0];
    let anchor_reused =
        leftover_matches(&first, anchor, |existing| existing.len() == group.size())?;
    if !anchor_reused {
        fs::copy(&first, anchor).map_err(|source| EngineError::moving(&first, "copy", source))?;
        created.push(anchor.clone());
        restore_attributes(&group.records[0], anchor);
    }
    let anchor_meta = fs::metadata(anchor)
        .map_err(|source| EngineError::moving(&first, "stat destination", source))?;
    for destination in &destinations[1..] {
        if leftover_matches(&first, destination, |existing| {
            existing.dev() == anchor_meta.dev() && existing.ino() == anchor_meta.ino()
        })? {
            continue;
        }
        fs::hard_link(anchor, destination)
            .map_err(|source| EngineError::moving(&first, "link", source))?;
        created.push(destination.clone());
    }
    Ok(())
}

/// Inspect an existing destination name. Returns `Ok(true)` when the name
/// can be kept as-is. A mismatched leftover is unlinked so the caller can
/// place the name fresh; a missing name just reports `Ok(false)`.
fn leftover_matches(
    group_first: &Path,
    destination: &Path,
    matches: impl Fn(&fs::Metadata) -> bool,
) -> EngineResult<bool> {
    match fs::symlink_metadata(destination) {
        Ok(existing) => {
            if existing.is_file() && matches(&existing) {
                debug!(path = %destination.display(), "destination name already placed; kept");
                return Ok(true);
            }
            warn!(path = %destination.display(), "replacing stale destination name");
            fs::remove_file(destination)
                .map_err(|source| EngineError::moving(group_first, "replace stale name", source))?;
            Ok(false)
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(EngineError::moving(group_first, "stat destination", source)),
    }
}

/// Best-effort ownership and mtime carry-over for a copied payload.
fn restore_attributes(record: &FileRecord, destination: &Path) {
    match fs::metadata(&record.path) {
        Ok(metadata) => {
            if let Err(error) = chown(
                destination,
                Some(Uid::from_raw(metadata.uid())),
                Some(Gid::from_raw(metadata.gid())),
            ) {
                debug!(path = %destination.display(), error = %error, "chown skipped");
            }
            let atime = TimeVal::new(metadata.atime(), metadata.atime_nsec() / 1_000);
            let mtime = TimeVal::new(metadata.mtime(), metadata.mtime_nsec() / 1_000);
            if let Err(error) = utimes(destination, &atime, &mtime) {
                debug!(path = %destination.display(), error = %error, "mtime carry-over skipped");
            }
        }
        Err(error) => {
            debug!(path = %record.path.display(), error = %error, "attribute carry-over skipped");
        }
    }
}

fn verify(
    group: &HardlinkGroup,
    destinations: &[PathBuf],
    same_device: bool,
) -> EngineResult<()> {
    let first = group.first_path().to_path_buf();
    let mut identity: Option<(u64, u64)> = None;

    for destination in destinations {
        let metadata = fs::metadata(destination)
            .map_err(|source| EngineError::moving(&first, "stat destination", source))?;
        if metadata.len() != group.size() {
            return Err(EngineError::Verify {
                group: first,
                detail: "destination size mismatch",
            });
        }
        let key = (metadata.dev(), metadata.ino());
        match identity {
            None => {
                let expected_links = u64::try_from(group.link_count()).unwrap_or(u64::MAX);
                if !same_device && metadata.nlink() != expected_links {
                    return Err(EngineError::Verify {
                        group: first,
                        detail: "destination link count mismatch",
                    });
                }
                identity = Some(key);
            }
            Some(expected) if expected == key => {}
            Some(_) => {
                return Err(EngineError::Verify {
                    group: first,
                    detail: "destination names split across objects",
                });
            }
        }
    }
    Ok(())
}

fn rollback(created: &[PathBuf]) {
    for path in created {
        if let Err(error) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %error, "rollback unlink failed");
        }
    }
}
