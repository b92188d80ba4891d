//! qBittorrent WebUI API (v2) backend for the torrent-side contract.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use strata_config::TorrentClientConfig;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{ClientError, ClientResult};
use crate::rewrite::PathRewriter;
use crate::{TorrentRef, TorrentStateClient};

/// Client for one qBittorrent endpoint.
pub struct QbitClient {
    label: String,
    base: String,
    user: String,
    password: String,
    rewriter: PathRewriter,
    http: reqwest::Client,
    logged_in: Mutex<bool>,
}

#[derive(Debug, Deserialize)]
struct TorrentInfo {
    hash: String,
    name: String,
    content_path: String,
}

impl QbitClient {
    /// Construct a client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidEndpoint`] for an unusable host value and
    /// [`ClientError::Http`] when the HTTP client cannot be built.
    pub fn new(config: &TorrentClientConfig) -> ClientResult<Self> {
        let base = config.host.trim_end_matches('/').to_string();
        if base.is_empty() {
            return Err(ClientError::InvalidEndpoint {
                endpoint: config.host.clone(),
                reason: "host cannot be empty",
            });
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .cookie_store(true)
            .build()
            .map_err(|source| ClientError::http("build_client", &base, source))?;
        Ok(Self {
            label: format!("qbittorrent@{base}"),
            base,
            user: config.user.clone(),
            password: config.password.clone(),
            rewriter: PathRewriter::new(config.rewrite.clone()),
            http,
            logged_in: Mutex::new(false),
        })
    }

    async fn ensure_login(&self) -> ClientResult<()> {
        let mut guard = self.logged_in.lock().await;
        if *guard {
            return Ok(());
        }
        let url = format!("{}/api/v2/auth/login", self.base);
        let response = self
            .http
            .post(&url)
            .form(&[("username", self.user.as_str()), ("password", self.password.as_str())])
            .send()
            .await
            .map_err(|source| ClientError::http("login", &url, source))?;
        if !response.status().is_success() {
            return Err(ClientError::status("login", &url, response.status().as_u16()));
        }
        let body = response
            .text()
            .await
            .map_err(|source| ClientError::http("login", &url, source))?;
        // The WebUI answers 200 with a "Fails." body on bad credentials.
        if body.trim() != "Ok." {
            return Err(ClientError::Auth {
                operation: "login",
                endpoint: self.base.clone(),
            });
        }
        *guard = true;
        Ok(())
    }

    async fn list_completed(&self) -> ClientResult<Vec<TorrentInfo>> {
        let url = format!("{}/api/v2/torrents/info?filter=completed", self.base);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| ClientError::http("list_torrents", &url, source))?;
        if !response.status().is_success() {
            return Err(ClientError::status(
                "list_torrents",
                &url,
                response.status().as_u16(),
            ));
        }
        response
            .json()
            .await
            .map_err(|source| ClientError::http("list_torrents", &url, source))
    }

    async fn post_hashes(&self, operation: &'static str, hash: &str) -> ClientResult<()> {
        let url = format!("{}/api/v2/torrents/{operation}", self.base);
        let response = self
            .http
            .post(&url)
            .form(&[("hashes", hash)])
            .send()
            .await
            .map_err(|source| ClientError::http("post_hashes", &url, source))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ClientError::status(
                "post_hashes",
                &url,
                response.status().as_u16(),
            ))
        }
    }
}

#[async_trait]
impl TorrentStateClient for QbitClient {
    fn label(&self) -> &str {
        &self.label
    }

    fn rewriter(&self) -> &PathRewriter {
        &self.rewriter
    }

    async fn resolve_references(
        &self,
        external_paths: &[PathBuf],
    ) -> ClientResult<HashMap<PathBuf, Vec<TorrentRef>>> {
        self.ensure_login().await?;
        let torrents = self.list_completed().await?;
        debug!(
            client = %self.label,
            torrents = torrents.len(),
            "torrent content listing fetched"
        );

        let mut references: HashMap<PathBuf, Vec<TorrentRef>> = HashMap::new();
        for path in external_paths {
            for torrent in &torrents {
                let content = Path::new(&torrent.content_path);
                // content_path is the torrent's file or root directory; a
                // prefix match covers both single-file and multi-file layouts.
                if path.starts_with(content) {
                    references
                        .entry(path.clone())
                        .or_default()
                        .push(TorrentRef {
                            client: self.label.clone(),
                            hash: torrent.hash.clone(),
                            name: torrent.name.clone(),
                        });
                }
            }
        }
        Ok(references)
    }

    async fn pause(&self, torrent: &TorrentRef) -> ClientResult<()> {
        self.ensure_login().await?;
        info!(client = %self.label, name = %torrent.name, hash = %torrent.hash, "pausing torrent");
        self.post_hashes("pause", &torrent.hash).await
    }

    async fn resume(&self, torrent: &TorrentRef) -> ClientResult<()> {
        self.ensure_login().await?;
        info!(client = %self.label, name = %torrent.name, hash = %torrent.hash, "resuming torrent");
        self.post_hashes("resume", &torrent.hash).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::time::Duration;

    fn config(base: &str) -> TorrentClientConfig {
        TorrentClientConfig {
            host: base.to_string(),
            user: "admin".to_string(),
            password: "secret".to_string(),
            rewrite: None,
            timeout: Duration::from_secs(2),
        }
    }

    fn mock_login(server: &MockServer) -> httpmock::Mock<'_> {
        server.mock(|when, then| {
            when.method(POST)
                .path("/api/v2/auth/login")
                .body_includes("username=admin");
            then.status(200).body("Ok.");
        })
    }

    #[tokio::test]
    async fn resolves_references_by_content_path_prefix() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        let login = mock_login(&server);
        let info = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v2/torrents/info")
                .query_param("filter", "completed");
            then.status(200).json_body(serde_json::json!([
                {"hash": "abc", "name": "show", "content_path": "/downloads/show"},
                {"hash": "def", "name": "movie", "content_path": "/downloads/movie.mkv"}
            ]));
        });

        let client = QbitClient::new(&config(&server.base_url()))?;
        let paths = vec![
            PathBuf::from("/downloads/show/e1.mkv"),
            PathBuf::from("/downloads/movie.mkv"),
            PathBuf::from("/downloads/unrelated.mkv"),
        ];
        let references = client.resolve_references(&paths).await?;

        login.assert();
        info.assert();
        assert_eq!(references[&paths[0]][0].hash, "abc");
        assert_eq!(references[&paths[1]][0].hash, "def");
        assert!(!references.contains_key(&paths[2]));
        Ok(())
    }

    #[tokio::test]
    async fn login_happens_once_across_calls() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        let login = mock_login(&server);
        let pause = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v2/torrents/pause")
                .body_includes("hashes=abc");
            then.status(200);
        });
        let resume = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v2/torrents/resume")
                .body_includes("hashes=abc");
            then.status(200);
        });

        let client = QbitClient::new(&config(&server.base_url()))?;
        let torrent = TorrentRef {
            client: client.label().to_string(),
            hash: "abc".to_string(),
            name: "show".to_string(),
        };
        client.pause(&torrent).await?;
        client.resume(&torrent).await?;

        login.assert();
        pause.assert();
        resume.assert();
        Ok(())
    }

    #[tokio::test]
    async fn bad_credentials_surface_auth_error() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/api/v2/auth/login");
            then.status(200).body("Fails.");
        });

        let client = QbitClient::new(&config(&server.base_url()))?;
        let err = client
            .resolve_references(&[PathBuf::from("/downloads/x")])
            .await
            .expect_err("login must fail");
        assert!(matches!(err, ClientError::Auth { .. }));
        Ok(())
    }
}
