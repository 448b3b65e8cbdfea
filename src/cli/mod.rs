use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "price-oracle")]
#[command(about = "Price-oracle backend for an AI-agent marketplace", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "ORACLE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API, WebSocket gateway, and scheduler together
    Serve,

    /// Run provider and agent-service crawlers
    Crawl {
        /// Run a single cycle and exit instead of starting the scheduler
        #[arg(long)]
        once: bool,
    },

    /// Alert operations
    Alerts {
        #[command(subcommand)]
        command: AlertsCommands,
    },

    /// Forecast operations
    Forecast {
        #[command(subcommand)]
        command: ForecastCommands,
    },

    /// Apply pending database migrations and exit
    Migrate,
}

#[derive(Subcommand)]
pub enum AlertsCommands {
    /// Evaluate all active alerts once
    Check,
}

#[derive(Subcommand)]
pub enum ForecastCommands {
    /// Generate forecasts for every tracked skill
    Generate,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
