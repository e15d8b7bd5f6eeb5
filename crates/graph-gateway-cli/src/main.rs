// crates/graph-gateway-cli/src/main.rs
// ============================================================================
// Module: Graph Gateway CLI Entry Point
// Description: Command dispatcher for serving and operating the gateway.
// Purpose: Run the MCP server, inspect the tool catalog, and sign payloads.
// Dependencies: clap, graph-gateway-config, graph-gateway-mcp, tokio.
// ============================================================================

//! ## Overview
//! `graph-gateway serve` runs the MCP server (stdio without a port, HTTP/SSE
//! with one). `graph-gateway tools list` prints the tool catalog as JSON.
//! `graph-gateway sign` computes the inbound signature for a request body so
//! operators can exercise protected endpoints by hand. Security posture: the
//! signing secret is only read from configuration and never printed.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use graph_gateway_config::GatewayConfig;
use graph_gateway_core::SigningSecret;
use graph_gateway_core::sign_payload;
use graph_gateway_core::signing::canonical_json_bytes;
use graph_gateway_core::tool_catalog;
use graph_gateway_mcp::McpServer;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum payload size accepted by `sign`.
const MAX_SIGN_BODY_BYTES: usize = 16 * 1024 * 1024;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Graph Gateway command-line interface.
#[derive(Parser, Debug)]
#[command(name = "graph-gateway", version, about = "Knowledge-graph MCP gateway")]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway MCP server.
    Serve(ServeCommand),
    /// Tool catalog utilities.
    Tools {
        /// Selected tools subcommand.
        #[command(subcommand)]
        command: ToolsCommand,
    },
    /// Compute the inbound request signature for a payload.
    Sign(SignCommand),
}

/// Configuration for the `serve` command.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Optional config file path (defaults to graph-gateway.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Listen port; overrides configuration and selects the HTTP transport.
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,
}

/// Tool catalog subcommands.
#[derive(Subcommand, Debug)]
enum ToolsCommand {
    /// Print the tool catalog as JSON.
    List,
}

/// Configuration for the `sign` command.
#[derive(Args, Debug)]
struct SignCommand {
    /// File holding the request body to sign.
    #[arg(long, value_name = "FILE")]
    body: PathBuf,
    /// Timestamp bound into the signature (sent as `x-fodda-timestamp`).
    #[arg(long, value_name = "TS")]
    timestamp: Option<String>,
    /// Canonicalize the body as JSON before signing.
    #[arg(long)]
    canonical: bool,
    /// Optional config file path supplying the signing secret.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for user-facing messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };
    match command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Tools {
            command: ToolsCommand::List,
        } => command_tools_list(),
        Commands::Sign(command) => command_sign(&command),
    }
}

/// Prints top-level help.
fn show_help() -> CliResult<()> {
    let mut command = Cli::command();
    command.print_help().map_err(|err| CliError::new(output_error("stdout", &err)))?;
    write_stdout_line("").map_err(|err| CliError::new(output_error("stdout", &err)))
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Runs the MCP server until shutdown.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let mut config = GatewayConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    if let Some(port) = command.port {
        config.server.port = Some(port);
    }
    let server = McpServer::from_config(config)
        .map_err(|err| CliError::new(format!("failed to initialize server: {err}")))?;
    server.serve().await.map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Prints the tool catalog.
fn command_tools_list() -> CliResult<ExitCode> {
    let rendered = serde_json::to_string_pretty(tool_catalog())
        .map_err(|err| CliError::new(format!("failed to render tool catalog: {err}")))?;
    write_stdout_line(&rendered).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Prints the signature for a payload file.
fn command_sign(command: &SignCommand) -> CliResult<ExitCode> {
    let config = GatewayConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    let secret = config
        .signing_secret
        .as_ref()
        .ok_or_else(|| CliError::new("no signing secret configured"))?;
    let body = read_bytes_with_limit(&command.body, MAX_SIGN_BODY_BYTES)?;
    let signature =
        signature_for(secret, command.timestamp.as_deref(), &body, command.canonical)?;
    write_stdout_line(&signature).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Computes the signature the gateway expects for `body`.
fn signature_for(
    secret: &SigningSecret,
    timestamp: Option<&str>,
    body: &[u8],
    canonical: bool,
) -> CliResult<String> {
    let timestamp = timestamp.map(str::trim).filter(|value| !value.is_empty());
    let bytes = if canonical {
        let value: Value = serde_json::from_slice(body)
            .map_err(|err| CliError::new(format!("body is not valid JSON: {err}")))?;
        canonical_json_bytes(&value).map_err(|err| CliError::new(err.to_string()))?
    } else {
        body.to_vec()
    };
    sign_payload(secret, timestamp, &bytes).map_err(|err| CliError::new(err.to_string()))
}

// ============================================================================
// SECTION: IO Helpers
// ============================================================================

/// Reads a file, refusing anything larger than `max_bytes`.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> CliResult<Vec<u8>> {
    let read_error =
        |err: std::io::Error| CliError::new(format!("failed to read {}: {err}", path.display()));
    let file = File::open(path).map_err(read_error)?;
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX);
    let size = file.metadata().map_err(read_error)?.len();
    if size > limit {
        return Err(too_large(path, max_bytes));
    }
    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1)).read_to_end(&mut bytes).map_err(read_error)?;
    if bytes.len() > max_bytes {
        return Err(too_large(path, max_bytes));
    }
    Ok(bytes)
}

/// Error for oversized inputs.
fn too_large(path: &Path, max_bytes: usize) -> CliError {
    CliError::new(format!("{} exceeds the {max_bytes} byte limit", path.display()))
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
