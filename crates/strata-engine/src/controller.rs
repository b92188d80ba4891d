//! Per-mapping orchestration: the scan → prioritize → move loop plus the
//! reverse promote flow.
//!
//! # Design
//! - One controller instance per mapping, driven to completion before the
//!   next mapping starts; no state is shared across mappings.
//! - Candidate state is rebuilt fresh every pass. The engine's own moves
//!   and external activity both shift usage, watched status, and torrent
//!   state between passes, so nothing is cached across iterations.
//! - A failed candidate never stops the pass; a failed mapping never stops
//!   the run. Only the phase reported at the end distinguishes them.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use globset::GlobSet;
use strata_clients::{MediaStateClient, TorrentStateClient};
use strata_config::Mapping;
use tracing::{debug, error, info, warn};

use crate::enrich::Enrichment;
use crate::error::EngineResult;
use crate::model::{FileKey, HardlinkGroup};
use crate::mover::MoveExecutor;
use crate::prioritize::prioritize;
use crate::scanner::{build_ignore_set, prune_empty_dirs, scan_groups};
use crate::usage::UsageProbe;

/// Number of recently-watched items requested per media client for the
/// promote flow.
const PROMOTE_FETCH_LIMIT: usize = 25;

/// Loop phase; `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Mapping not yet started.
    Idle,
    /// Walking the source root and sampling usage.
    Scanning,
    /// Enriching and ordering this pass's candidates.
    Prioritizing,
    /// Relocating candidates in priority order.
    Moving,
    /// Usage target met or candidates exhausted.
    Done,
    /// Mapping aborted on an unrecoverable condition.
    Failed,
}

/// Outcome of driving one mapping to a terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingReport {
    /// Terminal phase, `Done` or `Failed`.
    pub phase: Phase,
    /// Bytes relocated to the archive tier.
    pub bytes_evicted: u64,
    /// Groups relocated to the archive tier.
    pub groups_evicted: usize,
    /// Groups whose relocation failed and was rolled back.
    pub groups_failed: usize,
    /// Full scan passes performed.
    pub passes: usize,
    /// Bytes promoted back to the cache tier.
    pub bytes_promoted: u64,
    /// Groups promoted back to the cache tier.
    pub groups_promoted: usize,
    /// Empty directories pruned under the source root.
    pub dirs_pruned: usize,
}

impl MappingReport {
    const fn new() -> Self {
        Self {
            phase: Phase::Idle,
            bytes_evicted: 0,
            groups_evicted: 0,
            groups_failed: 0,
            passes: 0,
            bytes_promoted: 0,
            groups_promoted: 0,
            dirs_pruned: 0,
        }
    }
}

/// Drives one mapping through repeated scan → prioritize → move cycles.
pub struct MoveLoopController {
    mapping: Mapping,
    ignore: GlobSet,
    probe: Arc<dyn UsageProbe>,
    torrent_clients: Vec<Arc<dyn TorrentStateClient>>,
    media_clients: Vec<Arc<dyn MediaStateClient>>,
    executor: MoveExecutor,
}

impl MoveLoopController {
    /// Build a controller for one mapping.
    ///
    /// # Errors
    ///
    /// Returns an error when an ignore pattern fails to compile.
    pub fn new(
        mapping: Mapping,
        probe: Arc<dyn UsageProbe>,
        torrent_clients: Vec<Arc<dyn TorrentStateClient>>,
        media_clients: Vec<Arc<dyn MediaStateClient>>,
        dry_run: bool,
    ) -> EngineResult<Self> {
        let ignore = build_ignore_set(&mapping.ignore)?;
        let executor = MoveExecutor::new(torrent_clients.clone(), dry_run);
        Ok(Self {
            mapping,
            ignore,
            probe,
            torrent_clients,
            media_clients,
            executor,
        })
    }

    /// Drive the mapping to a terminal phase and report what happened.
    pub async fn run(&self) -> MappingReport {
        let mut report = MappingReport::new();
        self.evict(&mut report).await;

        if report.phase == Phase::Done && !self.executor.is_dry_run() {
            match prune_empty_dirs(&self.mapping.source, &self.ignore) {
                Ok(pruned) => report.dirs_pruned = pruned,
                Err(err) => {
                    warn!(source = %self.mapping.source.display(), error = %err, "empty directory pruning failed");
                }
            }
        }
        if report.phase == Phase::Done {
            self.promote(&mut report).await;
        }

        info!(
            source = %self.mapping.source.display(),
            phase = ?report.phase,
            bytes_evicted = report.bytes_evicted,
            groups_evicted = report.groups_evicted,
            groups_failed = report.groups_failed,
            passes = report.passes,
            bytes_promoted = report.bytes_promoted,
            "mapping finished"
        );
        report
    }

    async fn evict(&self, report: &mut MappingReport) {
        loop {
            report.phase = Phase::Scanning;
            report.passes += 1;

            let snapshot = match self.probe.sample(&self.mapping.source) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    error!(source = %self.mapping.source.display(), error = %err, "usage probe failed");
                    report.phase = Phase::Failed;
                    return;
                }
            };
            let mut deficit = snapshot.bytes_above(self.mapping.threshold);
            if deficit == 0 {
                debug!(
                    source = %self.mapping.source.display(),
                    percent = format_args!("{:.2}", snapshot.percent_used()),
                    "usage at or below threshold"
                );
                report.phase = Phase::Done;
                return;
            }
            info!(
                source = %self.mapping.source.display(),
                percent = format_args!("{:.2}", snapshot.percent_used()),
                deficit,
                pass = report.passes,
                "usage above threshold"
            );

            let groups = match scan_groups(&self.mapping.source, &self.ignore) {
                Ok(groups) => groups,
                Err(err) => {
                    error!(source = %self.mapping.source.display(), error = %err, "scan failed");
                    report.phase = Phase::Failed;
                    return;
                }
            };

            report.phase = Phase::Prioritizing;
            let host_paths: Vec<PathBuf> = groups
                .iter()
                .flat_map(HardlinkGroup::paths)
                .map(std::path::Path::to_path_buf)
                .collect();
            let enrichment =
                Enrichment::gather(&host_paths, &self.torrent_clients, &self.media_clients).await;
            let candidates = prioritize(
                groups,
                &enrichment,
                self.mapping.min_age,
                self.mapping.max_age,
                Utc::now(),
            );
            if candidates.is_empty() {
                info!(source = %self.mapping.source.display(), "no eligible candidates remain");
                report.phase = Phase::Done;
                return;
            }

            report.phase = Phase::Moving;
            let mut moved_this_pass = 0usize;
            for candidate in &candidates {
                if deficit == 0 {
                    break;
                }
                match self
                    .executor
                    .relocate(&candidate.group, &self.mapping.destination, &enrichment)
                    .await
                {
                    Ok(bytes) => {
                        report.bytes_evicted += bytes;
                        report.groups_evicted += 1;
                        moved_this_pass += 1;
                        if self.executor.is_dry_run() {
                            deficit = deficit.saturating_sub(bytes);
                        } else {
                            deficit = match self.probe.sample(&self.mapping.source) {
                                Ok(snapshot) => snapshot.bytes_above(self.mapping.threshold),
                                Err(err) => {
                                    error!(source = %self.mapping.source.display(), error = %err, "usage probe failed mid-pass");
                                    report.phase = Phase::Failed;
                                    return;
                                }
                            };
                        }
                    }
                    Err(err) => {
                        warn!(
                            group = %candidate.group.first_path().display(),
                            error = %err,
                            "candidate move failed; continuing with next"
                        );
                        report.groups_failed += 1;
                    }
                }
            }

            if deficit == 0 {
                report.phase = Phase::Done;
                return;
            }
            // A dry run cannot observe its own effect on usage, so one
            // simulated pass is all it gets.
            if self.executor.is_dry_run() || moved_this_pass == 0 {
                info!(
                    source = %self.mapping.source.display(),
                    deficit,
                    "candidates exhausted above threshold"
                );
                report.phase = Phase::Done;
                return;
            }
        }
    }

    /// Relocate recently-watched content from the archive tier back to the
    /// cache while cache usage stays below `cache_threshold`.
    async fn promote(&self, report: &mut MappingReport) {
        let Some(cache_threshold) = self.mapping.cache_threshold else {
            return;
        };
        let snapshot = match self.probe.sample(&self.mapping.source) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(source = %self.mapping.source.display(), error = %err, "usage probe failed; promote skipped");
                return;
            }
        };
        let mut budget = snapshot.bytes_below(cache_threshold);
        if budget == 0 {
            debug!(source = %self.mapping.source.display(), "cache at threshold; promote skipped");
            return;
        }

        let mut recent: Vec<PathBuf> = Vec::new();
        for client in &self.media_clients {
            match client.recently_watched(PROMOTE_FETCH_LIMIT).await {
                Ok(paths) => {
                    recent.extend(paths.iter().map(|path| client.rewriter().to_host(path)));
                }
                Err(err) => {
                    warn!(client = %client.label(), error = %err, "recently-watched lookup failed");
                }
            }
        }
        if recent.is_empty() {
            return;
        }

        let archive_groups = match scan_groups(&self.mapping.destination, &self.ignore) {
            Ok(groups) => groups,
            Err(err) => {
                warn!(destination = %self.mapping.destination.display(), error = %err, "archive scan failed; promote skipped");
                return;
            }
        };

        // One torrent lookup covers every group the loop might promote.
        let archive_paths: Vec<PathBuf> = archive_groups
            .iter()
            .flat_map(HardlinkGroup::paths)
            .map(std::path::Path::to_path_buf)
            .collect();
        let enrichment = Enrichment::gather(&archive_paths, &self.torrent_clients, &[]).await;

        let mut promoted: HashSet<FileKey> = HashSet::new();
        for cache_path in recent {
            let Ok(rel) = cache_path.strip_prefix(&self.mapping.source) else {
                continue;
            };
            // Already on the cache tier; nothing to promote.
            if cache_path.exists() {
                continue;
            }
            let archive_path = self.mapping.destination.join(rel);
            let Some(group) = archive_groups
                .iter()
                .find(|group| group.paths().any(|path| path == archive_path))
            else {
                continue;
            };
            if promoted.contains(&group.key) {
                continue;
            }
            if group.size() > budget {
                debug!(group = %group.first_path().display(), "promotion exceeds cache budget; skipped");
                continue;
            }

            match self
                .executor
                .relocate(group, &self.mapping.source, &enrichment)
                .await
            {
                Ok(bytes) => {
                    budget = budget.saturating_sub(bytes);
                    report.bytes_promoted += bytes;
                    report.groups_promoted += 1;
                    promoted.insert(group.key);
                }
                Err(err) => {
                    warn!(group = %group.first_path().display(), error = %err, "promotion failed; continuing");
                }
            }
        }
    }
}
