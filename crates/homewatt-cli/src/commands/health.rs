//! Agent backend health check

use std::path::Path;

use anyhow::Result;
use homewatt_core::AgentAdapter;

use super::{build_pipeline, load_config};

pub async fn cmd_health(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let (pipeline, agent) = build_pipeline(&config)?;

    println!("🔍 Checking agent backend...\n");
    println!("  Backend: {}", agent.backend_name());
    println!("  Host:    {}", agent.host());
    println!("  Model:   {}", agent.model());
    println!("  Forecast models: {}", pipeline.model_version());
    println!();

    if agent.health_check().await {
        println!("✅ Agent backend reachable");
    } else {
        println!("❌ Agent backend not reachable");
        println!();
        println!("Forecasts still work; optimize will return degraded insights.");
        println!("Check HOMEWATT_AGENT_BACKEND and HOMEWATT_AGENT_ENDPOINT.");
    }

    Ok(())
}
