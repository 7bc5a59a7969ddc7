//! Logging setup
//!
//! Human-readable (or JSON) output on stderr, plus an optional log file
//! written through a non-blocking appender. Keep the returned guard alive
//! for the life of the process or buffered file lines are lost.

use std::path::Path;

use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::LoggingConfig;

/// Flushes the log file on drop
pub struct LoggingGuard {
    _file: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// `RUST_LOG` wins over the configured level; garbage falls back to `warn`
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Install the global subscriber
///
/// A second call keeps the first subscriber (tests install their own).
pub fn init(config: &LoggingConfig) -> LoggingGuard {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    layers.push(if config.json {
        Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_current_span(true),
        )
    } else {
        Box::new(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
    });

    let mut file_guard = None;
    if let Some(path) = &config.file {
        let (layer, guard) = build_file_layer(path, config.json);
        layers.push(layer);
        file_guard = Some(guard);
    }

    layers.push(Box::new(build_filter(&config.level)));

    let _ = Registry::default().with(layers).try_init();

    LoggingGuard { _file: file_guard }
}

fn build_file_layer(
    path: &Path,
    json: bool,
) -> (
    Box<dyn Layer<Registry> + Send + Sync>,
    tracing_appender::non_blocking::WorkerGuard,
) {
    let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "zenedit.log".to_string());
    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer: Box<dyn Layer<Registry> + Send + Sync> = if json {
        Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false),
        )
    } else {
        Box::new(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
    };
    (layer, guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_accepts_directives() {
        // Only meaningful when RUST_LOG is unset, which is the case under cargo test
        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(build_filter("zenedit=debug").to_string(), "zenedit=debug");
        }
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            level: "debug".to_string(),
            json: true,
            file: Some(dir.path().join("zenedit.log")),
        };
        let _first = init(&config);
        let _second = init(&LoggingConfig::default());
        tracing::info!("logging initialised");
    }
}
