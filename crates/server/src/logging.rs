//! Structured file logging for the server.
//!
//! Everything goes to `<data_dir>/logs/server.log`, JSON lines by default.
//! Environment knobs:
//! - `COGNICORE_SERVER_LOG_FILTER` (falls back to `RUST_LOG`)
//! - `COGNICORE_SERVER_LOG_FORMAT=pretty` for human-readable output
//! - `COGNICORE_SERVER_RUN_ID` to tag a run, otherwise derived from pid and start time
//! - `COGNICORE_TRUNCATE_SERVER_LOG_ON_START=1` to start from an empty file

use std::fs::OpenOptions;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const LOG_FILE: &str = "server.log";
const DEFAULT_FILTER: &str = "info,tower_http=warn,hyper=warn,reqwest=warn";

/// Keeps the non-blocking writer alive. Drop it last.
pub struct LoggingHandle {
    pub run_id: String,
    _guard: WorkerGuard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    fn from_env() -> Self {
        match std::env::var("COGNICORE_SERVER_LOG_FORMAT") {
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

/// The first directive that parses wins: ours, then `RUST_LOG`, then the default.
fn resolve_filter() -> (EnvFilter, String) {
    ["COGNICORE_SERVER_LOG_FILTER", "RUST_LOG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find_map(|directive| {
            EnvFilter::try_new(&directive)
                .ok()
                .map(|filter| (filter, directive))
        })
        .unwrap_or_else(|| (EnvFilter::new(DEFAULT_FILTER), DEFAULT_FILTER.to_string()))
}

fn run_id() -> String {
    std::env::var("COGNICORE_SERVER_RUN_ID").unwrap_or_else(|_| {
        format!(
            "pid-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_millis()
        )
    })
}

pub fn init_logging(log_dir: &Path) -> anyhow::Result<LoggingHandle> {
    std::fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join(LOG_FILE);

    if std::env::var("COGNICORE_TRUNCATE_SERVER_LOG_ON_START").as_deref() == Ok("1") {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&log_path)?;
    }

    let (filter, directive) = resolve_filter();
    let format = LogFormat::from_env();
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, LOG_FILE));

    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_target(true);
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry.with(layer.pretty()).init(),
        LogFormat::Json => registry
            .with(layer.json().flatten_event(true).with_current_span(true))
            .init(),
    }

    let run_id = run_id();
    tracing::info!(
        component = "logging",
        event = "logging.initialized",
        log_path = %log_path.display(),
        format = format.as_str(),
        filter = %directive,
        run_id = %run_id,
    );

    Ok(LoggingHandle {
        run_id,
        _guard: guard,
    })
}
