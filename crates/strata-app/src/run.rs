//! Run orchestration: lock, load, then drive each mapping sequentially.

use std::sync::Arc;

use strata_clients::{build_media_clients, build_torrent_clients};
use strata_config::load_config;
use strata_engine::{MoveLoopController, Phase, StatvfsProbe, UsageProbe};
use tracing::info;

use crate::cli::Cli;
use crate::error::{AppError, AppResult};
use crate::lock::PidLock;
use crate::logging;

/// Execute one full run over every configured mapping.
///
/// Returns `true` when every mapping finished in its done phase. Mappings
/// are processed sequentially so usage accounting and move ordering stay
/// deterministic and never compete for destination capacity.
///
/// # Errors
///
/// Returns an error when the run cannot start at all: logging or lock
/// setup, configuration loading, or client construction.
pub async fn run(cli: Cli) -> AppResult<bool> {
    logging::init(&cli.log_level, cli.log_file.as_deref())?;
    let _lock = PidLock::acquire(&cli.lock_file)?;

    let config = load_config(&cli.config).map_err(|source| AppError::Config {
        operation: "load",
        source,
    })?;
    info!(
        config = %cli.config.display(),
        mappings = config.mappings.len(),
        dry_run = cli.dry_run,
        "run starting"
    );

    let probe: Arc<dyn UsageProbe> = Arc::new(StatvfsProbe);
    let mut all_done = true;
    for mapping in config.mappings {
        let torrent_clients =
            build_torrent_clients(&mapping.clients).map_err(|source| AppError::Client {
                operation: "torrent clients",
                source,
            })?;
        let media_clients =
            build_media_clients(&mapping.media).map_err(|source| AppError::Client {
                operation: "media clients",
                source,
            })?;
        let controller = MoveLoopController::new(
            mapping,
            Arc::clone(&probe),
            torrent_clients,
            media_clients,
            cli.dry_run,
        )
        .map_err(|source| AppError::Engine {
            operation: "controller",
            source,
        })?;
        let report = controller.run().await;
        if report.phase != Phase::Done {
            all_done = false;
        }
    }
    Ok(all_done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn cli(config: &Path, lock: &Path) -> Cli {
        Cli {
            config: config.to_path_buf(),
            lock_file: lock.to_path_buf(),
            log_file: None,
            log_level: "warn".to_string(),
            dry_run: false,
        }
    }

    #[tokio::test]
    async fn empty_configuration_succeeds() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let config = temp.path().join("strata.yaml");
        fs::write(&config, "mappings: []\n")?;

        let all_done = run(cli(&config, &temp.path().join("strata.lock"))).await?;
        assert!(all_done);
        // Lock released at the end of the run.
        assert!(!temp.path().join("strata.lock").exists());
        Ok(())
    }

    #[tokio::test]
    async fn held_lock_aborts_before_configuration_is_read() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let lock = temp.path().join("strata.lock");
        fs::write(&lock, std::process::id().to_string())?;

        // The config path does not even exist; the lock must fail first.
        let error = run(cli(&temp.path().join("missing.yaml"), &lock))
            .await
            .expect_err("held lock must abort");
        assert!(matches!(error, AppError::LockHeld { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_configuration_is_a_config_error() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let error = run(cli(
            &temp.path().join("missing.yaml"),
            &temp.path().join("strata.lock"),
        ))
        .await
        .expect_err("missing config must fail");
        assert!(matches!(error, AppError::Config { .. }));
        Ok(())
    }
}
