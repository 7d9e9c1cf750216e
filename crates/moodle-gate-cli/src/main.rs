// crates/moodle-gate-cli/src/main.rs
// ============================================================================
// Module: Moodle Gate CLI Entry Point
// Description: Command dispatcher for the gateway server and offline tasks.
// Purpose: Run the MCP gateway and export the Moodle service artifacts.
// Dependencies: clap, moodle-gate-config, moodle-gate-mcp, moodle-gate-sdk-gen
// ============================================================================

//! ## Overview
//! Two commands: `serve` runs the MCP gateway against a loaded
//! configuration, and `export-functions` derives the per-tier Moodle
//! service definitions from the built-in tool registry. Both fail closed:
//! a bad config or a malformed catalogue is a startup error, never a
//! degraded run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap::Subcommand;
use moodle_gate_config::GatewayConfig;
use moodle_gate_core::ToolRegistry;
use moodle_gate_mcp::GatewayServer;
use moodle_gate_mcp::builtin_tools;
use moodle_gate_sdk_gen::write_artifacts;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Definition
// ============================================================================

/// Moodle Gate command-line interface.
#[derive(Parser, Debug)]
#[command(name = "moodle-gate", version, about = "Multi-tenant MCP gateway for Moodle")]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the MCP gateway server.
    Serve(ServeCommand),
    /// Exports the per-tier Moodle service definition artifacts.
    ExportFunctions(ExportCommand),
}

/// Arguments for `serve`.
#[derive(Parser, Debug)]
struct ServeCommand {
    /// Path to the configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Arguments for `export-functions`.
#[derive(Parser, Debug)]
struct ExportCommand {
    /// Output directory for the generated artifacts.
    #[arg(long, default_value = "generated")]
    out: PathBuf,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI-level failure carrying a user-facing message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Message shown to the operator.
    message: String,
}

impl CliError {
    /// Wraps a message into a CLI error.
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
        Err(err) => {
            let _ = writeln!(std::io::stderr(), "error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::ExportFunctions(command) => command_export(&command),
    }
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = GatewayConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("config load failed: {err}")))?;
    let server = GatewayServer::new(config)
        .map_err(|err| CliError::new(format!("server startup failed: {err}")))?;
    server.serve().await.map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Export Command
// ============================================================================

/// Executes the `export-functions` command.
fn command_export(command: &ExportCommand) -> CliResult<ExitCode> {
    let registry = ToolRegistry::register(builtin_tools())
        .map_err(|err| CliError::new(format!("catalogue error: {err}")))?;
    write_artifacts(&registry, &command.out)
        .map_err(|err| CliError::new(format!("export failed: {err}")))?;
    let _ = writeln!(std::io::stdout(), "wrote service artifacts to {}", command.out.display());
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
