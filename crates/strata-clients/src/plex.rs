//! Plex Media Server backend for the media-side contract.
//!
//! Watched status comes from item view counts in the allow-listed library
//! sections (leaf episodes for shows). View counts are scoped per account:
//! the owner token always counts, and each allow-listed home user is queried
//! with its own token obtained through the plex.tv home-users API, so "any
//! allow-listed user watched it" unions across accounts. Live sessions are
//! filtered by account name instead; session metadata already names the
//! account.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use strata_config::MediaServerConfig;
use tracing::{debug, info};

use crate::error::{ClientError, ClientResult};
use crate::rewrite::PathRewriter;
use crate::MediaStateClient;

const TOKEN_HEADER: &str = "X-Plex-Token";
const ACCOUNT_HOST: &str = "https://plex.tv";
/// Continue-watching entries older than this never drive a promotion.
const CONTINUE_WATCHING_WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Client for one Plex endpoint.
pub struct PlexClient {
    label: String,
    base: String,
    account_base: String,
    token: String,
    libraries: Vec<String>,
    users: Vec<String>,
    rewriter: PathRewriter,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct Container<T> {
    #[serde(rename = "MediaContainer")]
    inner: T,
}

#[derive(Debug, Default, Deserialize)]
struct SectionList {
    #[serde(rename = "Directory", default)]
    directories: Vec<Section>,
}

#[derive(Debug, Deserialize)]
struct Section {
    key: String,
    title: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Default, Deserialize)]
struct ItemList {
    #[serde(rename = "Metadata", default)]
    metadata: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(rename = "ratingKey")]
    rating_key: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(rename = "viewCount", default)]
    view_count: u64,
    #[serde(rename = "lastViewedAt")]
    last_viewed_at: Option<i64>,
    #[serde(rename = "librarySectionTitle")]
    library_section_title: Option<String>,
    #[serde(rename = "Media", default)]
    media: Vec<Media>,
    #[serde(rename = "User")]
    user: Option<SessionUser>,
}

#[derive(Debug, Deserialize)]
struct Media {
    #[serde(rename = "Part", default)]
    parts: Vec<MediaPart>,
}

#[derive(Debug, Deserialize)]
struct MediaPart {
    file: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionUser {
    title: String,
}

#[derive(Debug, Default, Deserialize)]
struct HomeUserList {
    #[serde(default)]
    users: Vec<HomeUser>,
}

#[derive(Debug, Deserialize)]
struct HomeUser {
    id: u64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct HomeUserToken {
    #[serde(rename = "authToken")]
    auth_token: String,
}

impl Item {
    fn files(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.media
            .iter()
            .flat_map(|media| media.parts.iter())
            .filter_map(|part| part.file.as_deref().map(PathBuf::from))
    }
}

impl PlexClient {
    /// Construct a client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidEndpoint`] for an unusable URL or token
    /// and [`ClientError::Http`] when the HTTP client cannot be built.
    pub fn new(config: &MediaServerConfig) -> ClientResult<Self> {
        Self::with_account_host(config, ACCOUNT_HOST)
    }

    fn with_account_host(config: &MediaServerConfig, account_host: &str) -> ClientResult<Self> {
        let base = config.url.trim_end_matches('/').to_string();
        if base.is_empty() {
            return Err(ClientError::InvalidEndpoint {
                endpoint: config.url.clone(),
                reason: "url cannot be empty",
            });
        }
        if HeaderValue::from_str(&config.token).is_err() {
            return Err(ClientError::InvalidEndpoint {
                endpoint: base.clone(),
                reason: "token contains invalid header characters",
            });
        }
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|source| ClientError::http("build_client", &base, source))?;
        Ok(Self {
            label: format!("plex@{base}"),
            base,
            account_base: account_host.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            libraries: config.libraries.clone(),
            users: config.users.clone(),
            rewriter: PathRewriter::new(config.rewrite.clone()),
            http,
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        token: &str,
    ) -> ClientResult<T> {
        let url = format!("{}{path}", self.base);
        let response = self
            .http
            .get(&url)
            .header(TOKEN_HEADER, token)
            .send()
            .await
            .map_err(|source| ClientError::http(operation, &url, source))?;
        if !response.status().is_success() {
            return Err(ClientError::status(operation, &url, response.status().as_u16()));
        }
        response
            .json()
            .await
            .map_err(|source| ClientError::http(operation, &url, source))
    }

    async fn account_call<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
    ) -> ClientResult<T> {
        let url = format!("{}{path}", self.account_base);
        let response = self
            .http
            .request(method, &url)
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await
            .map_err(|source| ClientError::http(operation, &url, source))?;
        if !response.status().is_success() {
            return Err(ClientError::status(operation, &url, response.status().as_u16()));
        }
        response
            .json()
            .await
            .map_err(|source| ClientError::http(operation, &url, source))
    }

    /// Access tokens whose watch state counts: the owner token plus one
    /// switched token per allow-listed home user.
    async fn watch_tokens(&self) -> ClientResult<Vec<String>> {
        let mut tokens = vec![self.token.clone()];
        if self.users.is_empty() {
            return Ok(tokens);
        }
        let listing: HomeUserList = self
            .account_call("home_users", Method::GET, "/api/v2/home/users")
            .await?;
        for user in listing
            .users
            .into_iter()
            .filter(|user| self.users.contains(&user.title))
        {
            let switched: HomeUserToken = self
                .account_call(
                    "switch_user",
                    Method::POST,
                    &format!("/api/v2/home/users/{}/switch", user.id),
                )
                .await?;
            debug!(client = %self.label, user = %user.title, "home user token obtained");
            tokens.push(switched.auth_token);
        }
        Ok(tokens)
    }

    async fn allowed_sections(&self, token: &str) -> ClientResult<Vec<Section>> {
        let listing: Container<SectionList> =
            self.get("sections", "/library/sections", token).await?;
        Ok(listing
            .inner
            .directories
            .into_iter()
            .filter(|section| matches!(section.kind.as_str(), "movie" | "show"))
            .filter(|section| self.libraries.is_empty() || self.libraries.contains(&section.title))
            .collect())
    }

    async fn watched_files(&self) -> ClientResult<HashSet<PathBuf>> {
        let mut watched = HashSet::new();
        for token in self.watch_tokens().await? {
            self.watched_files_as(&token, &mut watched).await?;
        }
        debug!(client = %self.label, watched = watched.len(), "watched file set built");
        Ok(watched)
    }

    async fn watched_files_as(
        &self,
        token: &str,
        watched: &mut HashSet<PathBuf>,
    ) -> ClientResult<()> {
        for section in self.allowed_sections(token).await? {
            let items: Container<ItemList> = self
                .get(
                    "section_items",
                    &format!("/library/sections/{}/all", section.key),
                    token,
                )
                .await?;
            for item in &items.inner.metadata {
                match item.kind.as_deref() {
                    Some("movie") => {
                        if item.view_count > 0 {
                            watched.extend(item.files());
                        }
                    }
                    Some("show") => {
                        let Some(rating_key) = item.rating_key.as_deref() else {
                            continue;
                        };
                        let leaves: Container<ItemList> = self
                            .get(
                                "show_leaves",
                                &format!("/library/metadata/{rating_key}/allLeaves"),
                                token,
                            )
                            .await?;
                        for episode in &leaves.inner.metadata {
                            if episode.view_count > 0 {
                                watched.extend(episode.files());
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn user_allowed(&self, item: &Item) -> bool {
        self.users.is_empty()
            || item
                .user
                .as_ref()
                .is_some_and(|user| self.users.contains(&user.title))
    }

    fn library_allowed(&self, item: &Item) -> bool {
        self.libraries.is_empty()
            || item
                .library_section_title
                .as_ref()
                .is_some_and(|title| self.libraries.contains(title))
    }
}

/// Oldest `lastViewedAt` (epoch seconds) a continue-watching entry may carry.
fn continue_watching_cutoff() -> i64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs();
    i64::try_from(now.saturating_sub(CONTINUE_WATCHING_WINDOW.as_secs())).unwrap_or(i64::MAX)
}

#[async_trait]
impl MediaStateClient for PlexClient {
    fn label(&self) -> &str {
        &self.label
    }

    fn rewriter(&self) -> &PathRewriter {
        &self.rewriter
    }

    async fn watched_status(
        &self,
        external_paths: &[PathBuf],
    ) -> ClientResult<HashMap<PathBuf, bool>> {
        let watched = self.watched_files().await?;
        Ok(external_paths
            .iter()
            .map(|path| (path.clone(), watched.contains(path)))
            .collect())
    }

    async fn active_paths(&self) -> ClientResult<HashSet<PathBuf>> {
        let sessions: Container<ItemList> =
            self.get("sessions", "/status/sessions", &self.token).await?;
        let active: HashSet<PathBuf> = sessions
            .inner
            .metadata
            .iter()
            .filter(|item| self.user_allowed(item))
            .flat_map(Item::files)
            .collect();
        if !active.is_empty() {
            info!(client = %self.label, sessions = active.len(), "active playback detected");
        }
        Ok(active)
    }

    async fn recently_watched(&self, limit: usize) -> ClientResult<Vec<PathBuf>> {
        let cutoff = continue_watching_cutoff();
        let mut items: Vec<Item> = Vec::new();
        for token in self.watch_tokens().await? {
            let hub: Container<ItemList> = self
                .get("continue_watching", "/hubs/continueWatching/items", &token)
                .await?;
            items.extend(hub.inner.metadata);
        }
        // Freshest first; entries resumed longer ago than the window are
        // stale hub residue, not current viewing.
        items.sort_by(|a, b| b.last_viewed_at.cmp(&a.last_viewed_at));
        let mut seen = HashSet::new();
        Ok(items
            .iter()
            .filter(|item| self.library_allowed(item))
            .filter(|item| item.last_viewed_at.is_some_and(|viewed| viewed >= cutoff))
            .flat_map(Item::files)
            .filter(|path| seen.insert(path.clone()))
            .take(limit)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::time::Duration;
    use strata_config::MediaServerKind;

    fn config(base: &str, libraries: Vec<String>) -> MediaServerConfig {
        MediaServerConfig {
            kind: MediaServerKind::Plex,
            url: base.to_string(),
            token: "tok".to_string(),
            libraries,
            users: Vec::new(),
            rewrite: None,
            timeout: Duration::from_secs(2),
        }
    }

    fn mock_sections(server: &MockServer) -> httpmock::Mock<'_> {
        server.mock(|when, then| {
            when.method(GET)
                .path("/library/sections")
                .header(TOKEN_HEADER, "tok");
            then.status(200).json_body(serde_json::json!({
                "MediaContainer": {"Directory": [
                    {"key": "1", "title": "Movies", "type": "movie"},
                    {"key": "2", "title": "Shows", "type": "show"},
                    {"key": "3", "title": "Music", "type": "artist"}
                ]}
            }));
        })
    }

    #[tokio::test]
    async fn watched_status_reflects_view_counts() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        mock_sections(&server);
        server.mock(|when, then| {
            when.method(GET).path("/library/sections/1/all");
            then.status(200).json_body(serde_json::json!({
                "MediaContainer": {"Metadata": [
                    {"ratingKey": "10", "type": "movie", "viewCount": 2,
                     "Media": [{"Part": [{"file": "/data/movies/seen.mkv"}]}]},
                    {"ratingKey": "11", "type": "movie",
                     "Media": [{"Part": [{"file": "/data/movies/unseen.mkv"}]}]}
                ]}
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/library/sections/2/all");
            then.status(200).json_body(serde_json::json!({
                "MediaContainer": {"Metadata": [
                    {"ratingKey": "20", "type": "show", "title": "Show"}
                ]}
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/library/metadata/20/allLeaves");
            then.status(200).json_body(serde_json::json!({
                "MediaContainer": {"Metadata": [
                    {"ratingKey": "21", "type": "episode", "viewCount": 1,
                     "Media": [{"Part": [{"file": "/data/shows/e1.mkv"}]}]},
                    {"ratingKey": "22", "type": "episode",
                     "Media": [{"Part": [{"file": "/data/shows/e2.mkv"}]}]}
                ]}
            }));
        });

        let client = PlexClient::new(&config(&server.base_url(), Vec::new()))?;
        let paths = vec![
            PathBuf::from("/data/movies/seen.mkv"),
            PathBuf::from("/data/movies/unseen.mkv"),
            PathBuf::from("/data/shows/e1.mkv"),
            PathBuf::from("/data/shows/e2.mkv"),
            PathBuf::from("/data/never-in-library.mkv"),
        ];
        let status = client.watched_status(&paths).await?;
        assert!(status[&paths[0]]);
        assert!(!status[&paths[1]]);
        assert!(status[&paths[2]]);
        assert!(!status[&paths[3]]);
        assert!(!status[&paths[4]], "unknown paths map to not-watched");
        Ok(())
    }

    #[tokio::test]
    async fn library_allow_list_restricts_sections() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        mock_sections(&server);
        let movies = server.mock(|when, then| {
            when.method(GET).path("/library/sections/1/all");
            then.status(200)
                .json_body(serde_json::json!({"MediaContainer": {"Metadata": []}}));
        });
        // No mock for section 2: a request there would 404 and fail the call.
        let client = PlexClient::new(&config(&server.base_url(), vec!["Movies".to_string()]))?;
        client.watched_status(&[]).await?;
        movies.assert();
        Ok(())
    }

    #[tokio::test]
    async fn active_sessions_honor_user_allow_list() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/status/sessions");
            then.status(200).json_body(serde_json::json!({
                "MediaContainer": {"Metadata": [
                    {"type": "movie", "User": {"title": "alice"},
                     "Media": [{"Part": [{"file": "/data/movies/a.mkv"}]}]},
                    {"type": "movie", "User": {"title": "bob"},
                     "Media": [{"Part": [{"file": "/data/movies/b.mkv"}]}]}
                ]}
            }));
        });

        let mut cfg = config(&server.base_url(), Vec::new());
        cfg.users = vec!["alice".to_string()];
        let client = PlexClient::new(&cfg)?;
        let active = client.active_paths().await?;
        assert!(active.contains(&PathBuf::from("/data/movies/a.mkv")));
        assert!(!active.contains(&PathBuf::from("/data/movies/b.mkv")));
        Ok(())
    }

    #[tokio::test]
    async fn watched_status_unions_home_user_accounts() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/v2/home/users")
                .header(TOKEN_HEADER, "tok");
            then.status(200).json_body(serde_json::json!({
                "users": [
                    {"id": 5, "title": "alice"},
                    {"id": 6, "title": "bob"}
                ]
            }));
        });
        // No switch mock for bob: switching a user outside the allow-list
        // would 404 and fail the call.
        let switched = server.mock(|when, then| {
            when.method(POST).path("/api/v2/home/users/5/switch");
            then.status(200)
                .json_body(serde_json::json!({"authToken": "alice-token"}));
        });
        for token in ["tok", "alice-token"] {
            server.mock(|when, then| {
                when.method(GET)
                    .path("/library/sections")
                    .header(TOKEN_HEADER, token);
                then.status(200).json_body(serde_json::json!({
                    "MediaContainer": {"Directory": [
                        {"key": "1", "title": "Movies", "type": "movie"}
                    ]}
                }));
            });
        }
        // The owner has never seen the movie; alice has.
        server.mock(|when, then| {
            when.method(GET)
                .path("/library/sections/1/all")
                .header(TOKEN_HEADER, "tok");
            then.status(200).json_body(serde_json::json!({
                "MediaContainer": {"Metadata": [
                    {"ratingKey": "10", "type": "movie",
                     "Media": [{"Part": [{"file": "/data/movies/m.mkv"}]}]}
                ]}
            }));
        });
        let alice_items = server.mock(|when, then| {
            when.method(GET)
                .path("/library/sections/1/all")
                .header(TOKEN_HEADER, "alice-token");
            then.status(200).json_body(serde_json::json!({
                "MediaContainer": {"Metadata": [
                    {"ratingKey": "10", "type": "movie", "viewCount": 3,
                     "Media": [{"Part": [{"file": "/data/movies/m.mkv"}]}]}
                ]}
            }));
        });

        let mut cfg = config(&server.base_url(), Vec::new());
        cfg.users = vec!["alice".to_string()];
        let client = PlexClient::with_account_host(&cfg, &server.base_url())?;
        let paths = vec![PathBuf::from("/data/movies/m.mkv")];
        let status = client.watched_status(&paths).await?;
        switched.assert();
        alice_items.assert();
        assert!(status[&paths[0]], "a watch by any allow-listed user counts");
        Ok(())
    }

    #[tokio::test]
    async fn continue_watching_skips_stale_and_foreign_entries() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        let now = i64::try_from(
            SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs(),
        )?;
        server.mock(|when, then| {
            when.method(GET).path("/hubs/continueWatching/items");
            then.status(200).json_body(serde_json::json!({
                "MediaContainer": {"Metadata": [
                    {"type": "movie", "librarySectionTitle": "Movies",
                     "lastViewedAt": now - 3_600,
                     "Media": [{"Part": [{"file": "/data/movies/fresh.mkv"}]}]},
                    {"type": "movie", "librarySectionTitle": "Movies",
                     "lastViewedAt": now - 14 * 24 * 3_600,
                     "Media": [{"Part": [{"file": "/data/movies/stale.mkv"}]}]},
                    {"type": "movie", "librarySectionTitle": "Home Videos",
                     "lastViewedAt": now - 3_600,
                     "Media": [{"Part": [{"file": "/data/home/clip.mkv"}]}]}
                ]}
            }));
        });

        let client = PlexClient::new(&config(&server.base_url(), vec!["Movies".to_string()]))?;
        let recent = client.recently_watched(10).await?;
        assert_eq!(recent, vec![PathBuf::from("/data/movies/fresh.mkv")]);
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_server_reports_http_error() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/library/sections");
            then.status(503);
        });
        let client = PlexClient::new(&config(&server.base_url(), Vec::new()))?;
        let err = client.watched_status(&[]).await.expect_err("must fail");
        assert!(matches!(err, ClientError::HttpStatus { status: 503, .. }));
        Ok(())
    }
}
