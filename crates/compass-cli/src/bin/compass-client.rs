//! Demonstration client: launches the Compass Protocol server and calls each
//! of its tools once.

use anyhow::{Context, Result, bail};
use clap::Parser;
use compass_config::{CliOverrides, CompassConfig};
use compass_mcp::McpClient;
use compass_types::Implementation;
use serde_json::{Value, json};
use std::io;

#[derive(Parser)]
#[command(
    name = "compass-client",
    version,
    about = "Call the Compass Protocol server's tools"
)]
struct Cli {
    /// Server command to launch (defaults to the configured client command)
    #[arg(long)]
    server: Option<String>,

    /// Extra argument passed to the server (repeatable)
    #[arg(long = "server-arg", allow_hyphen_values = true)]
    server_args: Vec<String>,

    /// Name passed to the `greet` tool
    #[arg(long, default_value = "Alice")]
    name: String,

    /// Request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Enable verbose/debug logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = CompassConfig::load(CliOverrides {
        server_command: cli.server,
        server_args: (!cli.server_args.is_empty()).then_some(cli.server_args),
        client_timeout_ms: cli.timeout_ms,
        ..CliOverrides::default()
    })
    .context("Invalid configuration")?;

    let log_level = if cli.verbose {
        "debug"
    } else {
        config.log_level.as_deref().unwrap_or("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();

    let client_info = Implementation::new("compass-client", env!("CARGO_PKG_VERSION"));
    println!("Connecting to Compass Protocol MCP Server...");
    let client = McpClient::spawn(&config.client, client_info)
        .await
        .with_context(|| format!("Failed to connect to server '{}'", config.client.command))?;
    println!("Connected successfully!");
    println!();

    let calls = [
        ("version", "Calling 'version' tool...".to_string(), json!({})),
        ("ping", "Calling 'ping' tool...".to_string(), json!({})),
        (
            "greet",
            format!("Calling 'greet' tool with name '{}'...", cli.name),
            json!({ "name": cli.name }),
        ),
    ];
    let mut outcome = Ok(());
    for (tool, heading, arguments) in calls {
        println!("{heading}");
        outcome = call_and_print(&client, tool, arguments).await;
        if outcome.is_err() {
            break;
        }
        println!();
    }
    client.close().await;
    outcome?;

    println!("All tool calls completed successfully!");
    Ok(())
}

async fn call_and_print(client: &McpClient, tool: &str, arguments: Value) -> Result<()> {
    let result = client
        .call_tool(tool, arguments)
        .await
        .with_context(|| format!("Failed to call {tool} tool"))?;

    if result.is_error {
        bail!("{tool} tool returned an error: {}", result.text_content());
    }
    for text in result.content.iter().filter_map(|c| c.as_text()) {
        println!("  Response: {text}");
    }
    Ok(())
}
