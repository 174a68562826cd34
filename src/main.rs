use clap::{Parser, Subcommand};
use p4ic_cache::commands::*;
use p4ic_cache::core::{command_init::StateLocation, error::Result, print_error};
use std::env;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "p4ic-cache")]
#[command(about = "Inspect the cached state of a Perforce client")]
#[command(version = "0.1.0")]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Persisted state file to read
    #[arg(long, global = true, conflicts_with_all = ["server", "client"])]
    state: Option<PathBuf>,

    /// Server id (e.g. "perforce:1666"); used with --client
    #[arg(long, global = true)]
    server: Option<String>,

    /// Client (workspace) name; used with --server
    #[arg(long, global = true)]
    client: Option<String>,

    /// Configuration file to use instead of the default one
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the client, cache sizes and last refresh dates
    Status,
    /// List the pending updates waiting for the server
    Pending,
    /// List pending changelists and their open files
    Opened,
    /// List client roots, or find the best root for a directory
    Roots {
        /// Directory to match against the client roots
        #[arg(long)]
        reference: Option<PathBuf>,
    },
    /// Check local state against the pending updates
    Verify {
        /// Drop orphaned local state and save
        #[arg(long)]
        fix: bool,
    },
}

fn run(cli: Cli) -> Result<()> {
    let location = StateLocation::from_args(cli.state, cli.server, cli.client)?;
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Status => execute_status(&location, config),
        Commands::Pending => execute_pending(&location, config),
        Commands::Opened => execute_opened(&location, config),
        Commands::Roots { reference } => execute_roots(&location, config, reference),
        Commands::Verify { fix } => execute_verify(&location, config, fix),
    }
}

fn main() {
    let cli = Cli::parse();

    // Configure logging based on --debug flag
    if cli.debug {
        env::set_var("RUST_LOG", "debug");
    } else {
        env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    if let Err(e) = run(cli) {
        print_error(&e.to_string());
        std::process::exit(1);
    }
}
