//! Client enrichment: watched status, active playback, torrent references.
//!
//! All client calls happen here, once per iteration, concurrently across
//! endpoints. A failing endpoint never aborts the loop: a torrent client
//! failure drops its references for the iteration, a media client failure
//! degrades every unanswered path to [`WatchedState::Unknown`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use strata_clients::{MediaStateClient, TorrentRef, TorrentStateClient};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::model::{HardlinkGroup, WatchedState};

/// Per-iteration snapshot of external state, keyed by host paths.
#[derive(Debug)]
pub struct Enrichment {
    /// Watched answers per host path, merged across media clients.
    pub(crate) watched: HashMap<PathBuf, WatchedState>,
    /// Torrent references per host path, across torrent clients.
    pub(crate) torrents: HashMap<PathBuf, Vec<TorrentRef>>,
    /// Host paths backing sessions currently playing.
    pub(crate) active: HashSet<PathBuf>,
    /// Baseline for paths no client answered: [`WatchedState::NotWatched`]
    /// when every media client responded, [`WatchedState::Unknown`] otherwise.
    pub(crate) baseline: WatchedState,
}

impl Enrichment {
    /// Snapshot with no external state; every group reads as not watched.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            watched: HashMap::new(),
            torrents: HashMap::new(),
            active: HashSet::new(),
            baseline: WatchedState::NotWatched,
        }
    }

    /// Gather state from every configured client for the given host paths.
    pub async fn gather(
        host_paths: &[PathBuf],
        torrent_clients: &[Arc<dyn TorrentStateClient>],
        media_clients: &[Arc<dyn MediaStateClient>],
    ) -> Self {
        let mut snapshot = Self::empty();

        let mut torrent_tasks = JoinSet::new();
        for client in torrent_clients {
            let client = Arc::clone(client);
            let external: Vec<PathBuf> = host_paths
                .iter()
                .map(|path| client.rewriter().to_external(path))
                .collect();
            torrent_tasks.spawn(async move {
                let label = client.label().to_string();
                let result = client.resolve_references(&external).await;
                (client, label, result)
            });
        }

        let mut media_tasks = JoinSet::new();
        for client in media_clients {
            let client = Arc::clone(client);
            let external: Vec<PathBuf> = host_paths
                .iter()
                .map(|path| client.rewriter().to_external(path))
                .collect();
            media_tasks.spawn(async move {
                let label = client.label().to_string();
                let watched = client.watched_status(&external).await;
                let active = client.active_paths().await;
                (client, label, watched, active)
            });
        }

        while let Some(joined) = torrent_tasks.join_next().await {
            let Ok((client, label, result)) = joined else {
                warn!("torrent enrichment task aborted");
                continue;
            };
            match result {
                Ok(references) => {
                    for (external, refs) in references {
                        let host = client.rewriter().to_host(&external);
                        snapshot.torrents.entry(host).or_default().extend(refs);
                    }
                }
                Err(error) => {
                    warn!(client = %label, error = %error, "torrent lookup failed; references unavailable this iteration");
                }
            }
        }

        while let Some(joined) = media_tasks.join_next().await {
            let Ok((client, label, watched, active)) = joined else {
                warn!("media enrichment task aborted");
                snapshot.baseline = WatchedState::Unknown;
                continue;
            };
            match watched {
                Ok(answers) => {
                    for (external, is_watched) in answers {
                        let host = client.rewriter().to_host(&external);
                        let state = if is_watched {
                            WatchedState::Watched
                        } else {
                            WatchedState::NotWatched
                        };
                        snapshot
                            .watched
                            .entry(host)
                            .and_modify(|current| *current = current.merge(state))
                            .or_insert(state);
                    }
                }
                Err(error) => {
                    warn!(client = %label, error = %error, "watched lookup failed; degrading to unknown");
                    snapshot.baseline = WatchedState::Unknown;
                }
            }
            match active {
                Ok(paths) => {
                    snapshot
                        .active
                        .extend(paths.iter().map(|path| client.rewriter().to_host(path)));
                }
                Err(error) => {
                    warn!(client = %label, error = %error, "active session lookup failed; degrading to unknown");
                    snapshot.baseline = WatchedState::Unknown;
                }
            }
        }

        debug!(
            watched = snapshot.watched.len(),
            torrents = snapshot.torrents.len(),
            active = snapshot.active.len(),
            degraded = snapshot.baseline == WatchedState::Unknown,
            "enrichment gathered"
        );
        snapshot
    }

    /// Merged watched state for a group across every member name.
    #[must_use]
    pub fn watched_for(&self, group: &HardlinkGroup) -> WatchedState {
        group.paths().fold(self.baseline, |state, path| {
            state.merge(self.watched.get(path).copied().unwrap_or(self.baseline))
        })
    }

    /// Whether any member name backs a session currently playing.
    #[must_use]
    pub fn is_active(&self, group: &HardlinkGroup) -> bool {
        group.paths().any(|path| self.active.contains(path))
    }

    /// Deduplicated torrent references across the given host paths.
    #[must_use]
    pub fn torrents_for<'a>(&self, paths: impl Iterator<Item = &'a Path>) -> Vec<TorrentRef> {
        let mut seen = HashSet::new();
        let mut references = Vec::new();
        for path in paths {
            if let Some(refs) = self.torrents.get(path) {
                for reference in refs {
                    if seen.insert((reference.client.clone(), reference.hash.clone())) {
                        references.push(reference.clone());
                    }
                }
            }
        }
        references
    }
}
