//! Homewatt CLI - Home energy forecasting and advice
//!
//! Usage:
//!   homewatt predict --csv usage.csv --household H1     Forecast tomorrow
//!   homewatt optimize --csv usage.csv --household H1    Forecast + explanation + actions
//!   homewatt serve --port 3000                          Start web server
//!   homewatt health                                     Check the agent backend

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    // Logs go to stderr so JSON on stdout stays machine-readable
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Predict { target, location } => {
            commands::cmd_predict(config_path, &target, &location).await
        }
        Commands::Optimize {
            target,
            location,
            email,
            name,
            trace,
        } => {
            commands::cmd_optimize(
                config_path,
                &target,
                &location,
                email.as_deref(),
                name.as_deref(),
                trace,
            )
            .await
        }
        Commands::Serve {
            port,
            host,
            no_auth,
        } => commands::cmd_serve(config_path, &host, port, no_auth).await,
        Commands::Health => commands::cmd_health(config_path).await,
        Commands::Prompts { action } => match action {
            None | Some(PromptsAction::List) => commands::cmd_prompts_list(),
            Some(PromptsAction::Show { prompt_id }) => commands::cmd_prompts_show(&prompt_id),
            Some(PromptsAction::Path) => commands::cmd_prompts_path(),
        },
    }
}
