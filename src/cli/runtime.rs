use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{self, AppConfig, LoggingConfig};

/// Install the global subscriber. `RUST_LOG` wins over `level`; `debug`
/// forces debug. Logs go to stderr so structured stdout stays parseable.
///
/// Keep the returned guard alive for as long as file logging should flush.
pub fn init_logging(level: &str, debug: bool, logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let (file_layer, guard) = match &logging.file {
        Some(path) => {
            let (dir, name) = split_log_path(path)?;
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(&dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    let (text_layer, json_layer) = if logging.json {
        (None, Some(fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        (Some(fmt::layer().with_writer(std::io::stderr)), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

fn split_log_path(path: &Path) -> Result<(PathBuf, PathBuf)> {
    let name = path
        .file_name()
        .with_context(|| format!("logging.file has no file name: {}", path.display()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, PathBuf::from(name)))
}

pub struct LoadedConfig {
    pub config: AppConfig,
    /// The file that was read, or the last place looked when none existed.
    pub path: Option<PathBuf>,
    pub found: bool,
}

/// Priority: `--config` > ./config/pagepilot.yaml > <config dir>/pagepilot/config.yaml
///
/// Runs before logging is installed; the caller reports what was loaded.
pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let path = config::resolve_config_path(config_path.map(PathBuf::as_path));
    match path {
        Some(path) if path.exists() => {
            let config = config::load_file(&path)
                .await
                .with_context(|| format!("Failed to load config {}", path.display()))?;
            Ok(LoadedConfig {
                config,
                path: Some(path),
                found: true,
            })
        }
        Some(path) if config_path.is_some() => {
            anyhow::bail!("Config file not found: {}", path.display())
        }
        path => Ok(LoadedConfig {
            config: AppConfig::default(),
            path,
            found: false,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_paths_split_into_directory_and_name() {
        let (dir, name) = split_log_path(Path::new("logs/pagepilot.log")).unwrap();
        assert_eq!(dir, PathBuf::from("logs"));
        assert_eq!(name, PathBuf::from("pagepilot.log"));

        let (dir, _) = split_log_path(Path::new("pagepilot.log")).unwrap();
        assert_eq!(dir, PathBuf::from("."));

        assert!(split_log_path(Path::new("/")).is_err());
    }

    #[tokio::test]
    async fn explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.yaml");
        assert!(load_config(Some(&missing)).await.is_err());

        let present = dir.path().join("pagepilot.yaml");
        std::fs::write(&present, "snapshot:\n  include_disabled: true\n").unwrap();
        let loaded = load_config(Some(&present)).await.unwrap();
        assert!(loaded.found);
        assert!(loaded.config.snapshot.include_disabled);
        assert_eq!(loaded.path, Some(present));
    }
}
