//! `eid`: read Serbian eID cards from PC/SC readers

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eid_apdu_transport_pcsc::PcscDeviceManager;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

mod commands;
mod utils;

use commands::{list_command, read_command, watch_command};
use utils::{display, reader};

#[derive(Parser)]
#[command(version, about = "Read Serbian eID smart cards")]
struct Cli {
    /// Optional reader name to use (will auto-detect if not specified)
    #[arg(short, long)]
    reader: Option<String>,

    /// Debug level output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available readers
    List,

    /// Read the card once and print its contents
    Read {
        /// Print the record as JSON
        #[arg(long)]
        json: bool,

        /// Save the holder's photo to this file
        #[arg(long, value_name = "PATH")]
        photo: Option<PathBuf>,
    },

    /// Report card insertion and removal until interrupted
    Watch {
        /// Poll with probe connections instead of blocking status waits
        #[arg(long)]
        active_probe: bool,
    },

    /// List the record fields with their codes and JSON keys
    Fields,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match &cli.command {
        Commands::Fields => display::print_fields(),
        Commands::List => list_command(&PcscDeviceManager::new()?)?,
        Commands::Read { json, photo } => {
            let manager = PcscDeviceManager::new()?;
            let reader = match &cli.reader {
                Some(reader_name) => reader::find_reader_by_name(&manager, reader_name)?,
                None => reader::find_reader_with_card(&manager)?,
            };
            info!("Using reader: {}", reader.name());
            read_command(&manager, reader.name(), *json, photo.as_deref())?;
        }
        Commands::Watch { active_probe } => {
            let manager = PcscDeviceManager::new()?;
            let reader = match &cli.reader {
                Some(reader_name) => reader::find_reader_by_name(&manager, reader_name)?,
                None => reader::first_reader(&manager)?,
            };
            info!("Using reader: {}", reader.name());
            watch_command(&manager, reader.name(), *active_probe)?;
        }
    }

    Ok(())
}

fn setup_logging(verbose: bool) {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose, &directives))
        .with_ansi(true)
        .init();
}

/// `RUST_LOG` style directives on top of the level picked by `--verbose`
fn log_filter(verbose: bool, directives: &str) -> EnvFilter {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    EnvFilter::builder()
        .with_default_directive(level.into())
        .parse_lossy(directives)
}
