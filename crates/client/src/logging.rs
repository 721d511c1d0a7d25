//! File logging for the terminal client.
//!
//! Logs go to `<data_dir>/logs/client.log` so the terminal only shows the
//! conversation. `COGNICORE_CLIENT_LOG_FILTER` (falling back to `RUST_LOG`)
//! picks the filter and `COGNICORE_CLIENT_LOG_FORMAT=pretty` switches from
//! JSON lines to human-readable output.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const LOG_FILE: &str = "client.log";
const DEFAULT_FILTER: &str = "info,reqwest=warn,hyper=warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    fn from_env() -> Self {
        match std::env::var("COGNICORE_CLIENT_LOG_FORMAT") {
            Ok(value) if value.eq_ignore_ascii_case("pretty") => Self::Pretty,
            _ => Self::Json,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
        }
    }
}

fn resolve_filter() -> (EnvFilter, String) {
    ["COGNICORE_CLIENT_LOG_FILTER", "RUST_LOG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find_map(|directive| {
            EnvFilter::try_new(&directive)
                .ok()
                .map(|filter| (filter, directive))
        })
        .unwrap_or_else(|| (EnvFilter::new(DEFAULT_FILTER), DEFAULT_FILTER.to_string()))
}

/// `~/.cognicore`, or a temp-dir fallback when no home directory exists.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".cognicore")
}

/// Install the subscriber. Keep the returned guard alive until exit.
pub fn init_logging(log_dir: &Path) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let (filter, directive) = resolve_filter();
    let format = LogFormat::from_env();
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, LOG_FILE));

    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true);
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry.with(layer.pretty()).init(),
        LogFormat::Json => registry.with(layer.json().flatten_event(true)).init(),
    }

    tracing::info!(
        component = "logging",
        event = "logging.initialized",
        log_path = %log_dir.join(LOG_FILE).display(),
        format = format.as_str(),
        filter = %directive,
    );

    Ok(guard)
}
