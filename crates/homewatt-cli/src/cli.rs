//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

/// Homewatt - Predict home energy use and get advice on cutting it
#[derive(Parser)]
#[command(name = "homewatt")]
#[command(about = "Smart-home energy forecasting with agent-generated insights", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML), else HOMEWATT_CONFIG; HOMEWATT_* variables still win
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Which telemetry to forecast
#[derive(Args, Clone, Debug)]
pub struct TargetArgs {
    /// Usage CSV (timestamp,household_id,meter_id,consumption_kwh)
    #[arg(long)]
    pub csv: PathBuf,

    /// Household to forecast
    #[arg(long)]
    pub household: String,

    /// Meter or appliance; whole home when omitted
    #[arg(long)]
    pub meter: Option<String>,

    /// Day to forecast (YYYY-MM-DD); defaults to the day after the last sample
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// People living in the home
    #[arg(long)]
    pub household_size: Option<u32>,
}

/// Where the home is, for weather lookup
#[derive(Args, Clone, Debug)]
pub struct LocationArgs {
    /// Latitude for the weather lookup
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    pub lat: Option<f64>,

    /// Longitude for the weather lookup
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    pub lon: Option<f64>,

    /// IANA timezone for the weather lookup
    #[arg(long, default_value = "UTC")]
    pub timezone: String,

    /// City name, geocoded to coordinates (instead of --lat/--lon)
    #[arg(long, conflicts_with = "lat")]
    pub city: Option<String>,

    /// Mean temperature for the target day (skips the weather lookup)
    #[arg(long, allow_negative_numbers = true)]
    pub temp: Option<f64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Forecast consumption and print the Forecast as JSON
    Predict {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        location: LocationArgs,
    },

    /// Forecast, run the Interpreter and Advisor agents, print the Insight
    Optimize {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        location: LocationArgs,

        /// Email the Insight to this address (requires SMTP settings)
        #[arg(long)]
        email: Option<String>,

        /// Recipient name used in the email greeting
        #[arg(long, requires = "email")]
        name: Option<String>,

        /// Print the orchestrator's state transitions to stderr
        #[arg(long)]
        trace: bool,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a network.
        /// By default, the server requires a Bearer key from HOMEWATT_API_KEYS.
        #[arg(long)]
        no_auth: bool,
    },

    /// Check the configured agent backend
    Health,

    /// Manage agent prompts
    Prompts {
        #[command(subcommand)]
        action: Option<PromptsAction>,
    },
}

#[derive(Subcommand)]
pub enum PromptsAction {
    /// List all available prompts and their override status
    List,

    /// Show the content of a specific prompt
    Show {
        /// Prompt ID (interpret_forecast, advise_actions)
        prompt_id: String,
    },

    /// Show the path where prompt overrides should be placed
    Path,
}
