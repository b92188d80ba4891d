//! Jellyfin backend for the media-side contract.
//!
//! Watched status is gathered per allow-listed user from `IsPlayed` item
//! queries restricted to that user's allow-listed views; the union across
//! users drives the "any allow-listed user watched it" rule.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use strata_config::MediaServerConfig;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::rewrite::PathRewriter;
use crate::MediaStateClient;

/// Client for one Jellyfin endpoint.
pub struct JellyfinClient {
    label: String,
    base: String,
    libraries: Vec<String>,
    users: Vec<String>,
    rewriter: PathRewriter,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct User {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ItemPage {
    #[serde(rename = "Items", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(rename = "Id", default)]
    id: String,
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "MediaSources", default)]
    media_sources: Vec<MediaSource>,
}

#[derive(Debug, Deserialize)]
struct MediaSource {
    #[serde(rename = "Path")]
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Session {
    #[serde(rename = "UserName", default)]
    user_name: String,
    #[serde(rename = "NowPlayingItem")]
    now_playing: Option<Item>,
}

impl Item {
    fn paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.media_sources
            .iter()
            .filter_map(|source| source.path.as_deref().map(PathBuf::from))
    }
}

impl JellyfinClient {
    /// Construct a client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidEndpoint`] for an unusable URL or API key
    /// and [`ClientError::Http`] when the HTTP client cannot be built.
    pub fn new(config: &MediaServerConfig) -> ClientResult<Self> {
        let base = config.url.trim_end_matches('/').to_string();
        if base.is_empty() {
            return Err(ClientError::InvalidEndpoint {
                endpoint: config.url.clone(),
                reason: "url cannot be empty",
            });
        }
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let auth = HeaderValue::from_str(&format!("MediaBrowser Token=\"{}\"", config.token))
            .map_err(|_| ClientError::InvalidEndpoint {
                endpoint: base.clone(),
                reason: "api key contains invalid header characters",
            })?;
        headers.insert(AUTHORIZATION, auth);
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|source| ClientError::http("build_client", &base, source))?;
        Ok(Self {
            label: format!("jellyfin@{base}"),
            base,
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
        query: &[(&str, &str)],
    ) -> ClientResult<T> {
        let url = format!("{}{path}", self.base);
        let response = self
            .http
            .get(&url)
            .query(query)
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

    async fn allowed_users(&self) -> ClientResult<Vec<User>> {
        let users: Vec<User> = self.get("users", "/Users", &[]).await?;
        Ok(users
            .into_iter()
            .filter(|user| self.users.is_empty() || self.users.contains(&user.name))
            .collect())
    }

    async fn allowed_views(&self, user_id: &str) -> ClientResult<Vec<Item>> {
        let views: ItemPage = self
            .get("views", &format!("/Users/{user_id}/Views"), &[])
            .await?;
        Ok(views
            .items
            .into_iter()
            .filter(|view| self.libraries.is_empty() || self.libraries.contains(&view.name))
            .collect())
    }

    async fn played_paths(&self) -> ClientResult<HashSet<PathBuf>> {
        let mut played = HashSet::new();
        for user in self.allowed_users().await? {
            for view in self.allowed_views(&user.id).await? {
                let page: ItemPage = self
                    .get(
                        "played_items",
                        "/Items",
                        &[
                            ("UserId", user.id.as_str()),
                            ("ParentId", view.id.as_str()),
                            ("Recursive", "true"),
                            ("Filters", "IsPlayed"),
                            ("IncludeItemTypes", "Movie,Episode,Video"),
                            ("Fields", "MediaSources"),
                        ],
                    )
                    .await?;
                for item in &page.items {
                    played.extend(item.paths());
                }
            }
        }
        debug!(client = %self.label, played = played.len(), "played path set built");
        Ok(played)
    }
}

#[async_trait]
impl MediaStateClient for JellyfinClient {
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
        let played = self.played_paths().await?;
        Ok(external_paths
            .iter()
            .map(|path| (path.clone(), played.contains(path)))
            .collect())
    }

    async fn active_paths(&self) -> ClientResult<HashSet<PathBuf>> {
        let sessions: Vec<Session> = self.get("sessions", "/Sessions", &[]).await?;
        Ok(sessions
            .iter()
            .filter(|session| self.users.is_empty() || self.users.contains(&session.user_name))
            .filter_map(|session| session.now_playing.as_ref())
            .flat_map(Item::paths)
            .collect())
    }

    async fn recently_watched(&self, limit: usize) -> ClientResult<Vec<PathBuf>> {
        let limit_value = limit.to_string();
        let mut recent = Vec::new();
        for user in self.allowed_users().await? {
            let page: ItemPage = self
                .get(
                    "next_up",
                    "/Shows/NextUp",
                    &[
                        ("userId", user.id.as_str()),
                        ("fields", "MediaSources"),
                        ("limit", limit_value.as_str()),
                        ("enableUserData", "true"),
                    ],
                )
                .await?;
            for item in &page.items {
                recent.extend(item.paths());
            }
        }
        recent.truncate(limit);
        Ok(recent)
    }
}
