//! Compass Protocol MCP server, speaking JSON-RPC over stdin/stdout.

use anyhow::{Context, Result};
use clap::Parser;
use compass_config::{CliOverrides, CompassConfig};
use compass_mcp::McpServer;
use compass_tools::ToolRegistry;
use std::io;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "compass-protocol",
    version,
    about = "Compass Protocol MCP server over stdio"
)]
struct Cli {
    /// Version reported by the server and the `version` tool (overrides COMPASS_VERSION)
    #[arg(long)]
    server_version: Option<String>,

    /// Timeout for a single tool call in milliseconds
    #[arg(long)]
    tool_timeout_ms: Option<u64>,

    /// Enable verbose/debug logging
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = tokio::runtime::Runtime::new().context("Failed to start the async runtime")?;
    let outcome = runtime.block_on(run(cli));
    // A stdin read parked on a blocking thread only returns when the next
    // line arrives, so the runtime must not wait for it.
    runtime.shutdown_background();
    outcome
}

async fn run(cli: Cli) -> Result<()> {
    let config = CompassConfig::load(CliOverrides {
        server_version: cli.server_version,
        tool_timeout_ms: cli.tool_timeout_ms,
        ..CliOverrides::default()
    })
    .context("Invalid configuration")?;

    // stdout carries the protocol, so logs go to stderr
    let log_level = if cli.verbose {
        "debug"
    } else {
        config.log_level.as_deref().unwrap_or("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();

    tracing::info!(
        "Starting Compass Protocol MCP Server v{}",
        config.server.version
    );
    tracing::info!("Server will communicate over stdin/stdout");

    let registry = ToolRegistry::with_builtins(config.server.version.clone()).seal();
    let server = McpServer::new(config.server.clone(), registry, config.session.clone());
    tracing::debug!("Registered {} tools", server.tool_count());

    let shutdown = CancellationToken::new();
    let serve = server.serve_stdio(shutdown.clone());
    tokio::pin!(serve);

    // Polling both branches together installs the Ctrl+C handler before any
    // request is answered.
    let outcome = tokio::select! {
        outcome = &mut serve => outcome,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    tracing::info!("Interrupted, shutting down");
                    shutdown.cancel();
                }
                Err(e) => tracing::warn!("Cannot listen for Ctrl+C: {e}"),
            }
            serve.await
        }
    };

    if let Err(e) = outcome {
        tracing::error!("Session failed: {e}");
        return Err(e).context("MCP session terminated");
    }

    tracing::info!("Server stopped");
    Ok(())
}
