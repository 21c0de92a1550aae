//! Tracing setup.
//!
//! Logs go to `${JARVIS_HOME}/logs/jarvis.log`; stdout belongs to the
//! transcript and stderr to status lines.
//!
//! Environment variables:
//! - `JARVIS_LOG`: filter directive (`info`, `jarvis_core=debug`, ...).
//! - `RUST_LOG`: used when `JARVIS_LOG` is unset or invalid.

use std::path::Path;
use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::config::paths;

pub const LOG_FILE_NAME: &str = "jarvis.log";

const DEFAULT_FILTER: &str = "info";

static INIT: OnceLock<()> = OnceLock::new();

/// Installs the global subscriber once per process. Later calls do nothing.
pub fn init() {
    INIT.get_or_init(|| init_in(&paths::logs_dir()));
}

fn init_in(dir: &Path) {
    if let Err(err) = std::fs::create_dir_all(dir) {
        eprintln!("warning: logging disabled, cannot create {}: {err}", dir.display());
        return;
    }

    let writer = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(writer);

    let _ = tracing_subscriber::registry()
        .with(resolve_env_filter(
            std::env::var("JARVIS_LOG").ok().as_deref(),
            std::env::var("RUST_LOG").ok().as_deref(),
        ))
        .with(file_layer)
        .try_init();
}

fn resolve_env_filter(jarvis_log: Option<&str>, rust_log: Option<&str>) -> EnvFilter {
    [jarvis_log, rust_log]
        .into_iter()
        .flatten()
        .filter(|directive| !directive.trim().is_empty())
        .find_map(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_prefers_jarvis_log() {
        let filter = resolve_env_filter(Some("debug"), Some("warn"));
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn test_filter_falls_back_to_rust_log() {
        let filter = resolve_env_filter(None, Some("jarvis_core=trace"));
        assert_eq!(filter.to_string(), "jarvis_core=trace");

        let filter = resolve_env_filter(Some("  "), Some("warn"));
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    fn test_filter_defaults_to_info() {
        assert_eq!(resolve_env_filter(None, None).to_string(), "info");
    }
}
