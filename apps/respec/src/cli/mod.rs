//! # respec CLI Module
//!
//! This module implements the CLI interface for respec.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `sync` - Run one reconciliation pass
//! - `validate` - Parse and validate the spec release without touching anything
//! - `status` - Show tracked release and spec summary
//! - `queries` - List stored queries in the current release
//! - `query` - Execute a stored query against an embedded database

mod commands;

use crate::config::AppConfig;
use clap::{Parser, Subcommand};
use respec_core::RespecError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// respec - declarative schema reconciliation for document databases
///
/// Loads versioned collection/view/analyzer/stored-query definitions from a
/// spec release and converges the database toward them.
#[derive(Parser, Debug)]
#[command(name = "respec")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Spec release directory (overrides config file)
    #[arg(short = 'S', long, global = true)]
    pub spec_dir: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to (overrides config file)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run one reconciliation pass against an embedded database
    Sync {
        /// Reconcile even when the tracker says the release is current
        #[arg(short, long)]
        force: bool,

        /// Also drop live entities the spec no longer declares
        #[arg(long)]
        prune: bool,

        /// Plan only; print the operations without applying them
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Parse and validate the spec release
    Validate,

    /// Show tracked release and spec summary
    Status,

    /// List stored queries in the current release
    Queries,

    /// Execute a stored query against an embedded database
    Query {
        /// Stored query name
        #[arg(short, long)]
        name: String,

        /// Client parameters as inline JSON (e.g. '{"search_text": "coli"}')
        #[arg(short = 'P', long)]
        params: Option<String>,

        /// Seed documents file: JSON object mapping collection to doc array
        #[arg(short, long)]
        data_file: Option<PathBuf>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), RespecError> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(spec_dir) = cli.spec_dir {
        config.spec_dir = spec_dir;
    }
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            cmd_server(&config).await
        }
        Some(Commands::Sync {
            force,
            prune,
            dry_run,
        }) => cmd_sync(&config, force, prune, dry_run, json_mode),
        Some(Commands::Validate) => cmd_validate(&config, json_mode),
        Some(Commands::Queries) => cmd_queries(&config, json_mode),
        Some(Commands::Query {
            name,
            params,
            data_file,
        }) => cmd_query(&config, &name, params.as_deref(), data_file.as_deref(), json_mode),
        Some(Commands::Status) | None => cmd_status(&config, json_mode),
    }
}
