//! The `opal` binary: wires every constructor-injected service together
//! and runs the JSON-RPC stdio server.
//!
//! Tracing init → config load → construct shared services → run the
//! `opal-rpc` stdio server over those services.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use opal_agent::{AgentRuntime, AgentStates, CancelMap, EventBus, SubAgentTool};
use opal_domain::config::Config;
use opal_providers::ProviderRegistry;
use opal_rpc::transport::{PendingClientRequests, StdioWriter};
use opal_rpc::{RpcServer, ServerState, StdioClientRequester};
use opal_sessions::SessionStore;
use opal_skills::registry::SkillsRegistry;
use opal_tools::registry::ToolRegistry;
use opal_tools::{AskParentTool, AskUserTool, UseSkillTool};

/// Runs the agent as a JSON-RPC stdio server — no subcommands, since the
/// interactive CLI surface is out of scope.
#[derive(Debug, Parser)]
#[command(name = "opal", version, about)]
struct Cli {
    /// Path to the config file. Falls back to `OPAL_CONFIG`, then `opal.toml`.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .or_else(|| std::env::var("OPAL_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("opal.toml"));
    let config = Arc::new(Config::load_or_default(&config_path));
    let data_dir = config.resolve_data_dir();

    tracing::info!(data_dir = %data_dir.display(), "opal starting");

    let sessions = match SessionStore::open(&data_dir) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(error = %e, "failed to open session store");
            std::process::exit(1);
        }
    };

    let skills_root = config.skills.root.clone().unwrap_or_else(|| data_dir.join("skills"));
    let skills = Arc::new(SkillsRegistry::load(&skills_root).unwrap_or_else(|e| {
        tracing::warn!(error = %e, skills_root = %skills_root.display(), "failed to load skills, starting empty");
        SkillsRegistry::empty()
    }));

    // Concrete provider adapters (the HTTP/SSE wire format per vendor)
    // are an external-collaborator concern this core doesn't implement
    // — the registry starts empty and is populated by whatever
    // adapter crate the deployment links in.
    let provider_registry = ProviderRegistry::new();
    if provider_registry.is_empty() {
        tracing::warn!("no providers registered — agent/prompt will fail to resolve a model until one is");
    }
    let providers = Arc::new(provider_registry);

    let bus = Arc::new(EventBus::new());
    let cancels = Arc::new(CancelMap::new());
    let states = Arc::new(AgentStates::new());

    let writer = Arc::new(StdioWriter::new(tokio::io::stdout()));
    let pending = Arc::new(PendingClientRequests::new());
    let client: Arc<dyn opal_tools::ClientRequester> = Arc::new(StdioClientRequester::new(writer.clone(), pending.clone()));

    let tools = Arc::new(ToolRegistry::new());
    tools.register(Arc::new(UseSkillTool));
    tools.register(Arc::new(AskUserTool));
    tools.register(Arc::new(AskParentTool));

    let runtime = AgentRuntime::new(sessions, tools.clone(), providers, bus, cancels, states, skills, config.clone(), client);

    // `sub_agent` needs `Arc<AgentRuntime>`, which only exists after
    // `AgentRuntime::new` has already consumed a clone of this same
    // `Arc<ToolRegistry>` — registering it here, onto the handle `main`
    // kept, is what the registry's `RwLock`-backed `&self` API is for.
    if config.features.sub_agents {
        tools.register(Arc::new(SubAgentTool::new(runtime.clone())));
    }

    let state = Arc::new(ServerState::new(data_dir));
    let server = RpcServer::new(runtime, state, writer, pending);

    let exit_code = server.run().await;
    std::process::exit(exit_code);
}

/// Tracing to stderr only — stdout is reserved for JSON-RPC traffic.
/// `OPAL_LOG`
/// (falling back to `RUST_LOG`) sets the filter; `OPAL_LOG_FORMAT=pretty`
/// swaps the default JSON formatter for a human-readable one when a
/// developer runs the binary directly in a terminal.
fn init_tracing() {
    let filter = std::env::var("OPAL_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "opal=info,opal_agent=info,opal_rpc=info".to_string());
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let pretty = std::env::var("OPAL_LOG_FORMAT").map(|v| v == "pretty").unwrap_or(false);
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);

    if pretty {
        subscriber.pretty().init();
    } else {
        subscriber.json().init();
    }
}
