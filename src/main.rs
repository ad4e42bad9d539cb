//! CLI for PopQueue
//!
//! Subcommands:
//! - `transacted`: event-driven transacted listener, failing consumer (default)
//! - `polling`: polling listener, logging consumer
//!
//! The subcommands and the `POPQUEUE__*` overrides read by `load_config` sit
//! on top of the fixed wiring. Running with no arguments and no overrides
//! starts the transacted pipeline with its built-in defaults.

use clap::{Parser, Subcommand};
use popqueue::config::{Settings, load_config};
use popqueue::utils::{Result, logging};
use popqueue::{Application, Variant};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "popqueue")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Consume with a transacted listener; every third message fails and is redelivered
    Transacted,
    /// Poll the queue every second, up to ten messages at a time
    Polling,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&settings.log_level);

    let variant = match cli.command.unwrap_or(Command::Transacted) {
        Command::Transacted => Variant::Transacted,
        Command::Polling => Variant::Polling,
    };

    if let Err(e) = run(settings, variant).await {
        error!("Pipeline failed: {e}");
    }
}

async fn run(settings: Settings, variant: Variant) -> Result<()> {
    let app = Application::start(settings, variant);

    let signal = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received. Exiting gracefully.");
    app.shutdown().await;

    Ok(signal?)
}
