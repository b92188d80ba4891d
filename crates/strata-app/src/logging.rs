//! Tracing subscriber installation for the binary.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use crate::error::{AppError, AppResult};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides `level` when set. With a log file, output switches
/// to appended JSON lines without ANSI colors. An already-installed
/// subscriber is left in place (tests, embedding).
///
/// # Errors
///
/// Returns [`AppError::Io`] when the log file cannot be opened.
pub fn init(level: &str, log_file: Option<&Path>) -> AppResult<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = fmt::fmt().with_env_filter(env_filter).with_target(false);

    let installed = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| AppError::Io {
                    operation: "open log file",
                    path: path.to_path_buf(),
                    source,
                })?;
            builder
                .json()
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .try_init()
        }
        None => builder.try_init(),
    };
    drop(installed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_is_created_and_repeated_init_is_tolerated() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("strata.log");

        init("debug", Some(&path))?;
        assert!(path.exists());

        // A second install attempt must not error out the run.
        init("info", None)?;
        Ok(())
    }

    #[test]
    fn unopenable_log_file_is_reported() {
        let error = init("info", Some(Path::new("/nonexistent/dir/strata.log")))
            .expect_err("missing directory must fail");
        assert!(matches!(error, AppError::Io { .. }));
    }
}
