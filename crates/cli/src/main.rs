//! Diarist CLI: the main entry point.
//!
//! Commands:
//! - `init`    : Write a default config and persona documents
//! - `serve`   : Start the HTTP gateway and the profile sweep scheduler
//! - `chat`    : Send one message to a companion
//! - `analyze` : Derive a profile for one user now
//! - `sweep`   : Derive profiles for every user now
//! - `status`  : Show configuration and loaded personas

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "diarist",
    about = "Diarist: journaling backend with persona companions",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ~/.diarist/config.toml)
    #[arg(short, long, global = true, env = "DIARIST_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file and persona documents
    Init {
        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },

    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send one message to a companion and print the reply
    Chat {
        /// fumiko or krishna
        #[arg(short, long, default_value = "fumiko")]
        persona: String,

        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        message: String,
    },

    /// Derive and store a profile for one user
    Analyze {
        #[arg(short, long)]
        user: String,
    },

    /// Derive and store profiles for every user
    Sweep,

    /// Show configuration and loaded personas
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Init { force } => commands::init::run(config_path, force)?,
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Chat { persona, user, message } => commands::chat::run(config_path, &persona, &user, &message).await?,
        Commands::Analyze { user } => commands::profile::analyze(config_path, &user).await?,
        Commands::Sweep => commands::profile::sweep(config_path).await?,
        Commands::Status => commands::status::run(config_path)?,
    }

    Ok(())
}
