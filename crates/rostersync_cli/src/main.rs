//! RosterSync CLI
//!
//! Command-line tools for RosterSync.
//!
//! # Commands
//!
//! - `simulate` - Race several clients writing one field on an in-process server
//! - `inspect-cache` - Dump a client's file cache
//! - `seed` - Print the default roster
//! - `version` - Print version information

mod commands;

use clap::{Parser, Subcommand};
use rostersync_protocol::EditableField;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// RosterSync command-line tools.
#[derive(Parser)]
#[command(name = "rostersync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Race several clients writing the same field
    Simulate {
        /// Number of clients
        #[arg(short, long, default_value = "3")]
        clients: usize,

        /// Record to write
        #[arg(short, long, default_value = "stu-004")]
        record: String,

        /// Field to write
        #[arg(long, default_value = "attendance", value_parser = commands::parse_field)]
        field: EditableField,

        /// Value each client writes
        #[arg(long, default_value = "80")]
        value: String,

        /// Global version the server starts at
        #[arg(long, default_value = "5")]
        start_version: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump a client's file cache
    InspectCache {
        /// Cache directory
        #[arg(short, long)]
        path: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the default roster
    Seed {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Simulate {
            clients,
            record,
            field,
            value,
            start_version,
            format,
        } => {
            let args = commands::simulate::SimulateArgs {
                clients,
                record,
                field,
                value,
                start_version,
            };
            commands::simulate::run(&args, &format)?;
        }
        Commands::InspectCache { path, format } => {
            commands::inspect_cache::run(&path, &format)?;
        }
        Commands::Seed { format } => {
            commands::seed::run(&format)?;
        }
        Commands::Version => {
            println!("RosterSync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "Write attempts per edit: {}",
                rostersync_engine::MAX_WRITE_ATTEMPTS
            );
        }
    }

    Ok(())
}
