//! Server command implementation

use std::path::Path;

use anyhow::{Context, Result};
use homewatt_server::{AppState, ServerConfig, API_KEYS_ENV};

use super::load_config;

pub async fn cmd_serve(
    config_path: Option<&Path>,
    host: &str,
    port: u16,
    no_auth: bool,
) -> Result<()> {
    let config = load_config(config_path)?;

    let mut server_config = ServerConfig::from_env();
    if no_auth {
        server_config.require_auth = false;
    }

    println!("🚀 Starting Homewatt web server...");
    println!("   Listening: http://{}:{}", host, port);
    println!(
        "   Agent: {} ({})",
        config.agent.backend,
        config.agent.endpoint.as_deref().unwrap_or("no endpoint")
    );
    println!(
        "   Deadline: {}s, {} attempt(s) per stage",
        config.orchestrator.deadline.as_secs(),
        config.orchestrator.max_retries
    );
    if config.smtp.is_some() {
        println!("   📧 Email delivery: enabled");
    }

    if no_auth {
        println!();
        println!("   ⚠️  Authentication DISABLED - do not expose to network!");
    } else if server_config.api_keys.is_empty() {
        println!();
        println!(
            "   ⚠️  No API keys configured; set {} or every request will be rejected",
            API_KEYS_ENV
        );
    } else {
        println!(
            "   🔑 API keys: {} configured ({})",
            server_config.api_keys.len(),
            API_KEYS_ENV
        );
    }
    println!();

    let state = AppState::from_app_config(&config, server_config)
        .context("Failed to initialize server")?;
    homewatt_server::serve(state, host, port).await
}
