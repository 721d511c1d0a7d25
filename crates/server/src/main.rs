//! CogniCore Server
//!
//! Session registry for the CogniCore chat client.
//! Serves session CRUD over REST, builds prompts through an AI gateway and
//! proxies per-session chat traffic to the agent service.

mod logging;
mod paths;
mod prompt_builder;
mod proxy;
mod registry;
mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use crate::prompt_builder::{PromptBuilder, DEFAULT_PROMPT_MODEL};
use crate::registry::SessionStore;
use crate::state::AppState;

#[derive(Debug, Parser)]
#[command(
    name = "cognicore-server",
    about = "Session registry and chat proxy for CogniCore",
    version
)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "COGNICORE_BIND", default_value = "127.0.0.1:4000")]
    bind: SocketAddr,

    /// Data directory for the registry database and logs (default: ~/.cognicore)
    #[arg(long, env = "COGNICORE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Base URL of the chat agent service
    #[arg(long, env = "COGNICORE_AGENT_URL", default_value = "http://127.0.0.1:8787")]
    agent_url: String,

    /// OpenAI-compatible gateway used by the prompt builder
    #[arg(long, env = "COGNICORE_AI_BASE_URL")]
    ai_base_url: Option<String>,

    /// API key for the AI gateway
    #[arg(long, env = "COGNICORE_AI_API_KEY", hide_env_values = true)]
    ai_api_key: Option<String>,

    /// Model used by the prompt builder
    #[arg(long, env = "COGNICORE_PROMPT_MODEL", default_value = DEFAULT_PROMPT_MODEL)]
    prompt_model: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    paths::init_data_dir(args.data_dir.as_deref());
    paths::ensure_dirs()?;
    let log_handle = logging::init_logging(&paths::log_dir())?;

    info!(
        component = "server",
        event = "server.start",
        run_id = %log_handle.run_id,
        data_dir = %paths::data_dir().display(),
        agent_url = %args.agent_url,
        prompt_builder = args.ai_base_url.is_some() && args.ai_api_key.is_some(),
        "Starting CogniCore Server"
    );

    let store = SessionStore::open(paths::db_path())?;
    let prompts = PromptBuilder::new(args.ai_base_url, args.ai_api_key, args.prompt_model);
    let state = AppState::new(store, prompts, &args.agent_url);
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    info!(
        component = "server",
        event = "server.listening",
        addr = %args.bind,
        "Listening"
    );
    axum::serve(listener, app).await?;

    Ok(())
}
