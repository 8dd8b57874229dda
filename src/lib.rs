pub mod agent;
pub mod cli;
pub mod config;
pub mod format;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod prompt;
pub mod providers;
pub mod session;

use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Client;
use std::io;
use tracing::{info, warn};

use cli::Cli;
use config::Config;
use gateway::HostGateway;
use orchestrator::{Outcome, Status, run_with};
use session::ConfigStore;

pub async fn run() -> Result<Status> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let cfg = Config::from_env();
    info!(
        session_path = %cfg.session_path.display(),
        openai_base_url = %cfg.openai_base_url,
        anthropic_base_url = %cfg.anthropic_base_url,
        tools_url_set = cfg.tools_url.is_some(),
        "loaded runtime configuration"
    );

    let client = Client::builder()
        .build()
        .context("Failed to initialize HTTP client")?;
    let store = ConfigStore::new(&cfg.session_path);
    let stored = store.load();
    let gateway = HostGateway::new(&client, &cfg);

    let mut stdout = io::stdout();
    let mut approve = prompt::confirm_on_terminal;
    let Outcome { config, result } =
        run_with(&cli, stored, &gateway, &mut stdout, &mut approve).await;

    if let Err(err) = store.save(&config) {
        if result.is_ok() {
            return Err(err);
        }
        warn!(error = %format!("{err:#}"), "failed to save session config");
    }
    result
}
