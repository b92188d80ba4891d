//! Typed configuration models for mover mappings.
//!
//! # Design
//! - Pure data carriers deserialized from the YAML document.
//! - Durations are humantime strings ("2h", "35d") in the document.
//! - Secrets may use `env:NAME` indirection; the loader resolves them so the
//!   engine only ever sees final values.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Default eligibility floor applied when a mapping omits `min_age`.
pub const DEFAULT_MIN_AGE: Duration = Duration::from_secs(2 * 60 * 60);

/// Default timeout applied to every remote client call.
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Root configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Mover mappings processed sequentially, in document order.
    #[serde(default)]
    pub mappings: Vec<Mapping>,
}

/// One cache-to-archive relocation mapping.
#[derive(Debug, Clone, Deserialize)]
pub struct Mapping {
    /// Cache-tier root the scanner walks.
    pub source: PathBuf,
    /// Archive-tier root files relocate to.
    pub destination: PathBuf,
    /// Used-capacity percentage above which eviction starts.
    pub threshold: f64,
    /// Optional cache-tier floor enabling the reverse promote flow.
    #[serde(default)]
    pub cache_threshold: Option<f64>,
    /// Minimum residency before a group becomes eligible.
    #[serde(default = "default_min_age", deserialize_with = "de_duration")]
    pub min_age: Duration,
    /// Optional residency ceiling forcing a group ahead of all others.
    #[serde(default, deserialize_with = "de_opt_duration")]
    pub max_age: Option<Duration>,
    /// Glob patterns excluded from scanning entirely.
    #[serde(default)]
    pub ignore: Vec<String>,
    /// Torrent client endpoints coordinated during moves.
    #[serde(default)]
    pub clients: Vec<TorrentClientConfig>,
    /// Media server endpoints consulted for watched status.
    #[serde(default)]
    pub media: Vec<MediaServerConfig>,
}

/// Prefix substitution between host paths and an external service's view.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RewriteRule {
    /// Path prefix as the external service sees it.
    pub from: String,
    /// Corresponding prefix on the scanned filesystem.
    pub to: String,
}

/// Connection settings for one torrent client endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TorrentClientConfig {
    /// Base URL of the WebUI API.
    pub host: String,
    /// Login user name.
    pub user: String,
    /// Login password; supports `env:NAME` indirection.
    pub password: String,
    /// Optional path rewrite between the client's view and the host.
    #[serde(default)]
    pub rewrite: Option<RewriteRule>,
    /// Per-call timeout.
    #[serde(default = "default_client_timeout", deserialize_with = "de_duration")]
    pub timeout: Duration,
}

/// Media server backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaServerKind {
    /// Plex Media Server.
    Plex,
    /// Jellyfin.
    Jellyfin,
}

impl MediaServerKind {
    /// Render the kind as its lowercase identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plex => "plex",
            Self::Jellyfin => "jellyfin",
        }
    }
}

/// Connection settings for one media server endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaServerConfig {
    /// Backend variant.
    pub kind: MediaServerKind,
    /// Base URL of the server.
    pub url: String,
    /// Access token or API key; supports `env:NAME` indirection.
    pub token: String,
    /// Library titles considered; empty means all libraries.
    #[serde(default)]
    pub libraries: Vec<String>,
    /// User names considered; empty means all users.
    #[serde(default)]
    pub users: Vec<String>,
    /// Optional path rewrite between the server's view and the host.
    #[serde(default)]
    pub rewrite: Option<RewriteRule>,
    /// Per-call timeout.
    #[serde(default = "default_client_timeout", deserialize_with = "de_duration")]
    pub timeout: Duration,
}

const fn default_min_age() -> Duration {
    DEFAULT_MIN_AGE
}

const fn default_client_timeout() -> Duration {
    DEFAULT_CLIENT_TIMEOUT
}

fn de_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn de_opt_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|value| humantime::parse_duration(&value).map_err(serde::de::Error::custom))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_defaults_apply() -> anyhow::Result<()> {
        let mapping: Mapping = serde_yaml::from_str(
            "source: /mnt/cache\ndestination: /mnt/archive\nthreshold: 70\n",
        )?;
        assert_eq!(mapping.min_age, DEFAULT_MIN_AGE);
        assert!(mapping.max_age.is_none());
        assert!(mapping.cache_threshold.is_none());
        assert!(mapping.ignore.is_empty());
        assert!(mapping.clients.is_empty());
        assert!(mapping.media.is_empty());
        Ok(())
    }

    #[test]
    fn durations_parse_from_humantime_strings() -> anyhow::Result<()> {
        let mapping: Mapping = serde_yaml::from_str(
            "source: /mnt/cache\ndestination: /mnt/archive\nthreshold: 70\nmin_age: 2h\nmax_age: 45d\n",
        )?;
        assert_eq!(mapping.min_age, Duration::from_secs(2 * 60 * 60));
        assert_eq!(mapping.max_age, Some(Duration::from_secs(45 * 24 * 60 * 60)));
        Ok(())
    }

    #[test]
    fn invalid_duration_is_rejected() {
        let parsed: Result<Mapping, _> = serde_yaml::from_str(
            "source: /mnt/cache\ndestination: /mnt/archive\nthreshold: 70\nmin_age: sideways\n",
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn media_kind_parses_lowercase() -> anyhow::Result<()> {
        let media: MediaServerConfig = serde_yaml::from_str(
            "kind: jellyfin\nurl: http://jf:8096\ntoken: abc\n",
        )?;
        assert_eq!(media.kind, MediaServerKind::Jellyfin);
        assert_eq!(media.kind.as_str(), "jellyfin");
        Ok(())
    }
}
