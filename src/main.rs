// src/main.rs

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;
use tokio::sync::mpsc;

use foothold::config::Config;
use foothold::console::Console;
use foothold::{logging, output};

/// foothold — operator console for remote penetration-testing labs.
#[derive(Debug, Parser)]
#[command(
    name = "foothold",
    version,
    about = "Operator console for remote penetration-testing labs",
    long_about = None
)]
struct Cli {
    /// Path to the console configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Optional console command to run once before dropping to the prompt.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    logging::init()?;
    let cli = Cli::parse();

    let config = Config::load(cli.config)?;
    let mut console = Console::new(config).await?;

    // Forward Ctrl-C presses as explicit interrupt events. Installing the
    // handler up front also keeps a stray Ctrl-C at the prompt from killing
    // the console outright.
    let (interrupt_events, mut interrupts) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if interrupt_events.send(()).is_err() {
                break;
            }
        }
    });

    if cli.command.is_empty() {
        console.run().await?;
    } else {
        console.dispatch(&cli.command.join(" ")).await;
        if console.has_live_jobs().await {
            output::warn("background jobs active, starting interpreter");
            console.run().await?;
        }
    }

    // Only presses during the drain count toward the two-strike policy.
    while interrupts.try_recv().is_ok() {}
    console.drain_jobs(&mut interrupts).await;

    Ok(())
}
