#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

//! External service clients the mover engine coordinates with.
//!
//! One capability contract per side: [`TorrentStateClient`] resolves which
//! torrents reference a path and can pause/resume them; [`MediaStateClient`]
//! resolves watched status, active playback, and the recently-watched listing.
//! Backends: qBittorrent for the torrent side, Plex and Jellyfin for media.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use strata_config::{MediaServerConfig, MediaServerKind, TorrentClientConfig};

pub mod error;
pub mod jellyfin;
pub mod plex;
pub mod qbittorrent;
pub mod rewrite;

pub use error::{ClientError, ClientResult};
pub use rewrite::PathRewriter;

/// Association between a rewritten path and one torrent on one client.
///
/// Used only to decide whether a pause is required before touching the file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TorrentRef {
    /// Label of the client that owns the torrent.
    pub client: String,
    /// Torrent hash used for pause/resume calls.
    pub hash: String,
    /// Display name for logging.
    pub name: String,
}

/// Capability contract for a torrent client endpoint.
#[async_trait]
pub trait TorrentStateClient: Send + Sync {
    /// Stable label identifying this endpoint in logs and [`TorrentRef`]s.
    fn label(&self) -> &str;

    /// Path translation between the host filesystem and this client's view.
    fn rewriter(&self) -> &PathRewriter;

    /// Resolve which torrents reference each of the given external paths.
    ///
    /// Queries the client's content listing once per call, not once per path.
    async fn resolve_references(
        &self,
        external_paths: &[PathBuf],
    ) -> ClientResult<HashMap<PathBuf, Vec<TorrentRef>>>;

    /// Pause a torrent. Idempotent: pausing an already-paused torrent is fine.
    async fn pause(&self, torrent: &TorrentRef) -> ClientResult<()>;

    /// Resume a torrent. Only issued for torrents this engine itself paused.
    async fn resume(&self, torrent: &TorrentRef) -> ClientResult<()>;
}

/// Capability contract for a media server endpoint.
#[async_trait]
pub trait MediaStateClient: Send + Sync {
    /// Stable label identifying this endpoint in logs.
    fn label(&self) -> &str;

    /// Path translation between the host filesystem and this server's view.
    fn rewriter(&self) -> &PathRewriter;

    /// Watched status per external path, restricted to the configured
    /// library/user allow-lists. A path absent from any watch history maps
    /// to `false`.
    async fn watched_status(
        &self,
        external_paths: &[PathBuf],
    ) -> ClientResult<HashMap<PathBuf, bool>>;

    /// External paths backing sessions that are currently playing.
    async fn active_paths(&self) -> ClientResult<HashSet<PathBuf>>;

    /// External paths of recently-watched / up-next items, most recent first.
    async fn recently_watched(&self, limit: usize) -> ClientResult<Vec<PathBuf>>;
}

/// Build one torrent client per configured endpoint.
///
/// # Errors
///
/// Returns [`ClientError`] when an HTTP client cannot be constructed.
pub fn build_torrent_clients(
    configs: &[TorrentClientConfig],
) -> ClientResult<Vec<Arc<dyn TorrentStateClient>>> {
    configs
        .iter()
        .map(|config| {
            qbittorrent::QbitClient::new(config)
                .map(|client| Arc::new(client) as Arc<dyn TorrentStateClient>)
        })
        .collect()
}

/// Build one media client per configured endpoint.
///
/// # Errors
///
/// Returns [`ClientError`] when an HTTP client cannot be constructed.
pub fn build_media_clients(
    configs: &[MediaServerConfig],
) -> ClientResult<Vec<Arc<dyn MediaStateClient>>> {
    configs
        .iter()
        .map(|config| match config.kind {
            MediaServerKind::Plex => plex::PlexClient::new(config)
                .map(|client| Arc::new(client) as Arc<dyn MediaStateClient>),
            MediaServerKind::Jellyfin => jellyfin::JellyfinClient::new(config)
                .map(|client| Arc::new(client) as Arc<dyn MediaStateClient>),
        })
        .collect()
}
