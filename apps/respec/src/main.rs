//! # respec - Declarative Schema Reconciliation Server
//!
//! The main binary for the respec reconciliation engine.
//!
//! This application provides:
//! - HTTP REST API server (axum-based) for queries and sync triggers
//! - CLI interface for validate/sync/query operations
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 apps/respec (THE BINARY)                 │
//! │                                                          │
//! │   ┌─────────────┐            ┌─────────────┐             │
//! │   │   CLI       │            │   HTTP API  │             │
//! │   │  (clap)     │            │   (axum)    │             │
//! │   └──────┬──────┘            └──────┬──────┘             │
//! │          │                          │                    │
//! │          └────────────┬─────────────┘                    │
//! │                       ▼                                  │
//! │               ┌───────────────┐                          │
//! │               │  respec-core  │                          │
//! │               │  (THE LOGIC)  │                          │
//! │               └───────────────┘                          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! respec server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! respec validate --spec-dir ./spec
//! respec sync --dry-run
//! respec query -n fulltext_search -P '{"search_text": "coli"}'
//! ```

use clap::Parser;
use respec::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // Initialize tracing — RESPEC_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("RESPEC_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "respec=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Display startup banner
    if !cli.quiet {
        print_banner();
    }

    // Execute command
    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the respec startup banner.
fn print_banner() {
    println!(
        r#"
  ██████╗ ███████╗███████╗██████╗ ███████╗ ██████╗
  ██╔══██╗██╔════╝██╔════╝██╔══██╗██╔════╝██╔════╝
  ██████╔╝█████╗  ███████╗██████╔╝█████╗  ██║
  ██╔══██╗██╔══╝  ╚════██║██╔═══╝ ██╔══╝  ██║
  ██║  ██║███████╗███████║██║     ███████╗╚██████╗
  ╚═╝  ╚═╝╚══════╝╚══════╝╚═╝     ╚══════╝ ╚═════╝

  Schema Reconciliation Server v{}

  Declarative • Convergent • Idempotent
"#,
        env!("CARGO_PKG_VERSION")
    );
}
