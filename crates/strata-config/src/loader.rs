//! Configuration file loading and secret resolution.
//!
//! # Design
//! - Read and parse the YAML document, then resolve `env:NAME` secret
//!   indirections in place so downstream crates only see final values.
//! - Validation runs last so errors reference resolved data.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::Config;
use crate::validate::validate_config;

const ENV_PREFIX: &str = "env:";

/// Load, resolve, and validate the configuration document at `path`.
///
/// # Errors
///
/// Returns [`ConfigError`] when the file cannot be read or parsed, a secret
/// indirection names an unset environment variable, or validation fails.
pub fn load_config(path: &Path) -> ConfigResult<Config> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::io("read", path, source))?;
    let mut config: Config = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    resolve_secrets(&mut config)?;
    validate_config(&config)?;

    debug!(
        path = %path.display(),
        mappings = config.mappings.len(),
        "configuration loaded"
    );
    Ok(config)
}

fn resolve_secrets(config: &mut Config) -> ConfigResult<()> {
    for mapping in &mut config.mappings {
        for client in &mut mapping.clients {
            client.password = resolve_secret("clients.password", &client.password)?;
        }
        for media in &mut mapping.media {
            media.token = resolve_secret("media.token", &media.token)?;
        }
    }
    Ok(())
}

fn resolve_secret(field: &'static str, value: &str) -> ConfigResult<String> {
    let Some(variable) = value.strip_prefix(ENV_PREFIX) else {
        return Ok(value.to_string());
    };
    std::env::var(variable).map_err(|_| ConfigError::MissingSecret {
        field,
        variable: variable.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r"
mappings:
  - source: /mnt/cache/media
    destination: /mnt/archive/media
    threshold: 70
    cache_threshold: 40
    min_age: 2h
    max_age: 45d
    ignore:
      - '**/.incomplete/**'
    clients:
      - host: http://qbit:8080
        user: admin
        password: env:PATH
    media:
      - kind: plex
        url: http://plex:32400
        token: plain-token
        libraries: [Movies]
";

    fn write_config(contents: &str) -> anyhow::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        file.write_all(contents.as_bytes())?;
        Ok(file)
    }

    #[test]
    fn loads_and_resolves_secrets() -> anyhow::Result<()> {
        // PATH is always present, which keeps the test read-only on the env.
        let file = write_config(SAMPLE)?;
        let config = load_config(file.path())?;
        assert_eq!(config.mappings.len(), 1);
        assert_eq!(config.mappings[0].clients[0].password, std::env::var("PATH")?);
        assert_eq!(config.mappings[0].media[0].token, "plain-token");
        Ok(())
    }

    #[test]
    fn missing_secret_variable_fails() -> anyhow::Result<()> {
        let file = write_config(
            "mappings:\n  - source: /a\n    destination: /b\n    threshold: 50\n    clients:\n      - host: http://q:8080\n        user: u\n        password: env:STRATA_TEST_UNSET_SECRET\n",
        )?;
        let err = load_config(file.path()).expect_err("unset variable must fail");
        assert!(matches!(err, ConfigError::MissingSecret { .. }));
        Ok(())
    }

    #[test]
    fn missing_file_reports_io_error() {
        let err = load_config(Path::new("/nonexistent/strata.yaml"))
            .expect_err("missing file must fail");
        assert!(matches!(err, ConfigError::Io { operation: "read", .. }));
    }

    #[test]
    fn malformed_document_reports_parse_error() -> anyhow::Result<()> {
        let file = write_config("mappings: [not, a, mapping]")?;
        let err = load_config(file.path()).expect_err("malformed document must fail");
        assert!(matches!(err, ConfigError::Parse { .. }));
        Ok(())
    }
}
