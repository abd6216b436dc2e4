#![forbid(unsafe_code)]

//! @acp:module "Poll MCP Server Entry Point"
//! @acp:summary "Main entry point for the poll MCP server"
//! @acp:domain mcp
//! @acp:layer application
//!
//! The poll MCP server runs conditional questionnaires: forms are cloned
//! into replies that AI agents fill in question by question over the
//! Model Context Protocol.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod mcp;
mod poll;
mod state;

/// Poll MCP Server - conditional questionnaires over MCP
#[derive(Parser, Debug)]
#[command(name = "poll-mcp")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project root directory
    #[arg(long, short = 'C')]
    directory: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging (to stderr so stdout is free for MCP)
    init_logging(&cli.log_level);

    // Determine project root
    let project_root = match cli.directory {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    info!("Poll MCP Server starting");
    info!("Project root: {}", project_root.display());

    // Run MCP server over stdio
    mcp::run_stdio_server(&project_root).await
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
