use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "duet")]
#[command(version = "0.1.0")]
#[command(about = "Dual-entry cycle engine for binary prediction markets", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable dry run mode (no real orders)
    #[arg(short, long, default_value = "true")]
    pub dry_run: bool,

    /// Underlying symbol the windows are keyed to
    #[arg(short, long, default_value = "BTCUSDT")]
    pub symbol: String,

    /// Config directory
    #[arg(short, long, default_value = "config")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the engine with the status/config API
    Run {
        /// Start creating cycles immediately instead of waiting for
        /// POST /api/system/start
        #[arg(long)]
        autostart: bool,
    },
    /// Validate the configuration and exit
    CheckConfig,
}
