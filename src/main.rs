//! # InboxPilot — Todoist webhook automation
//!
//! Receives Todoist webhooks and applies the section rule table: context
//! labels, project moves, due-date templates, and deferral handling.
//!
//! Usage:
//!   inboxpilot                         # Start with ~/.inboxpilot/config.toml
//!   inboxpilot --config ./pilot.toml   # Explicit config file
//!   inboxpilot --port 9000 --verbose

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use inboxpilot_core::PilotConfig;
use inboxpilot_gateway::AppState;

#[derive(Parser)]
#[command(name = "inboxpilot", version, about = "Todoist webhook automation")]
struct Cli {
    /// Config file path (default: ~/.inboxpilot/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so TODOIST_API_TOKEN from it is visible to the config load.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = if cli.verbose {
        "inboxpilot=debug,tower_http=debug"
    } else {
        "inboxpilot=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => {
            let mut c = PilotConfig::load_from(std::path::Path::new(path))?;
            c.apply_env();
            c
        }
        None => PilotConfig::load()?,
    };
    if let Some(host) = cli.host {
        config.gateway.host = host;
    }
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }

    if config.api_token.is_empty() {
        anyhow::bail!("no Todoist API token: set TODOIST_API_TOKEN or api_token in the config");
    }

    tracing::info!("inboxpilot v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "{} section rules, {} label routes, dedup window {}s",
        config.rules.sections.len(),
        config.rules.label_routes.len(),
        config.dedup.window_secs,
    );

    let state = Arc::new(AppState::from_config(config)?);
    inboxpilot_gateway::start(state).await
}
