//! Process-wide `tracing` setup.
//!
//! Output goes to stderr in either a human-readable or JSON-lines format.
//! An optional log file receives the same events through a daily-rotating,
//! non-blocking appender; keep the returned guard alive until exit so the
//! file is flushed. `RUST_LOG` overrides the default filter.

use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "stagebot=debug,tower_http=debug"
    } else {
        "stagebot=info,tower_http=info"
    }
}

fn stderr_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .boxed(),
    }
}

fn file_layer(format: LogFormat, path: &Path) -> Result<(BoxedLayer, WorkerGuard)> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let prefix = path
        .file_name()
        .context("Log file path has no file name")?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let appender = tracing_appender::rolling::daily(dir, prefix);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = match format {
        LogFormat::Pretty => fmt::layer().with_ansi(false).with_writer(writer).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
    };
    Ok((layer, guard))
}

/// Install the global subscriber. Call once, early in `main`.
pub fn init(format: LogFormat, log_file: Option<&Path>, verbose: bool) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let mut layers: Vec<BoxedLayer> = vec![stderr_layer(format)];
    let guard = match log_file {
        Some(path) => {
            let (layer, guard) = file_layer(format, path)?;
            layers.push(layer);
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert!(default_filter(false).contains("stagebot=info"));
        assert!(default_filter(true).contains("stagebot=debug"));
    }

    #[test]
    fn test_file_layer_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("stagebot.log");
        let (_layer, _guard) = file_layer(LogFormat::Json, &path).unwrap();
        assert!(dir.path().join("logs").is_dir());
    }

    #[test]
    fn test_format_values() {
        assert_eq!(LogFormat::from_str("json", true).unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("pretty", true).unwrap(), LogFormat::Pretty);
    }
}
