//! CogniCore terminal client
//!
//! Line-oriented front end over `StateCoordinator`. Plain lines are sent to
//! the current session; `/commands` manage sessions and settings.

mod logging;
mod repl;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use cognicore_client::{
    FileSettingsStore, HttpRegistryClient, HttpStreamingChannel, StateCoordinator,
};

#[derive(Debug, Parser)]
#[command(
    name = "cognicore",
    about = "Terminal chat client for the CogniCore session registry",
    version
)]
struct Args {
    /// Base URL of the registry server
    #[arg(long, env = "COGNICORE_SERVER_URL", default_value = "http://127.0.0.1:4000")]
    server: String,

    /// Data directory for settings and logs (default: ~/.cognicore)
    #[arg(long, env = "COGNICORE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Connect and history-fetch timeout in seconds
    #[arg(long, env = "COGNICORE_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let data_dir = args.data_dir.unwrap_or_else(logging::default_data_dir);
    let _log_guard = logging::init_logging(&data_dir.join("logs"))?;

    tracing::info!(
        component = "client",
        event = "client.start",
        server = %args.server,
        data_dir = %data_dir.display(),
        "Starting CogniCore client"
    );

    let timeout = Duration::from_secs(args.timeout_secs);
    let registry = Arc::new(HttpRegistryClient::new(&args.server, timeout)?);
    let channel = Arc::new(HttpStreamingChannel::new(&args.server, timeout)?);
    let store = Arc::new(FileSettingsStore::new(data_dir.join("settings.json")));
    let coordinator = StateCoordinator::new(registry.clone(), channel, store);

    repl::run(coordinator, registry).await
}
