// crates/iris-lots-cli/src/main.rs
// ============================================================================
// Module: Iris Lots CLI Entry Point
// Description: Command dispatcher for the lot queue.
// Purpose: Initialize the queue, submit batches, drain lots, and recover results.
// Dependencies: clap, iris-lots-cli, iris-lots-config, iris-lots-core, serde, thiserror
// ============================================================================

//! ## Overview
//! Every command except `config validate` loads the configuration, assembles
//! the runtime, and runs the worker in the foreground until the queue is idle.
//! Results go to stdout as JSON lines; errors go to stderr with a failure exit
//! code. Certificate input files are untrusted and read under a size limit.

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
use clap::Parser;
use clap::Subcommand;
use iris_lots_cli::wiring::LotRuntime;
use iris_lots_cli::wiring::open_store;
use iris_lots_config::IrisLotsConfig;
use iris_lots_core::Certificate;
use iris_lots_core::LotUid;
use iris_lots_core::OwnerId;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a certificate batch input file.
const MAX_INPUT_BYTES: usize = 16 * 1024 * 1024;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "iris-lots", version, disable_help_subcommand = true)]
struct Cli {
    /// Config file path (defaults to `IRIS_LOTS_CONFIG` or iris-lots.toml).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the queue schema, optionally wiping every lot first.
    Init(InitCommand),
    /// Submit a certificate batch and code it.
    Submit(SubmitCommand),
    /// Drain every ready lot through the coding tool.
    Run,
    /// Poll a lot and deliver its coded certificates.
    Recover(RecoverCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Arguments for `init`.
#[derive(Args, Debug)]
struct InitCommand {
    /// Drop every lot, coded result, and queue entry before recreating.
    #[arg(long)]
    reset: bool,
}

/// Arguments for `submit`.
#[derive(Args, Debug)]
struct SubmitCommand {
    /// Requesting owner.
    #[arg(long, value_name = "OWNER")]
    owner: String,
    /// JSON array of certificates.
    #[arg(long, value_name = "FILE")]
    input: PathBuf,
}

/// Arguments for `recover`.
#[derive(Args, Debug)]
struct RecoverCommand {
    /// Requesting owner.
    #[arg(long, value_name = "OWNER")]
    owner: String,
    /// Lot identifier returned by `submit`.
    #[arg(long, value_name = "UID")]
    uid: String,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate the configuration file.
    Validate,
}

// ============================================================================
// SECTION: Output Types
// ============================================================================

/// Output of `submit`.
#[derive(Debug, Serialize)]
struct SubmitOutput<'a> {
    /// Lot identifier for later recovery.
    uid: &'a LotUid,
}

/// Output of `run`.
#[derive(Debug, Serialize)]
struct RunSummary {
    /// Lots completed by the worker.
    processed: usize,
    /// Fault that stopped the worker, if any.
    fault: Option<String>,
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
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run(cli: Cli) -> CliResult<ExitCode> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Init(command) => command_init(config_path, &command),
        Commands::Submit(command) => command_submit(config_path, &command),
        Commands::Run => command_run(config_path),
        Commands::Recover(command) => command_recover(config_path, &command),
        Commands::Config {
            command: ConfigCommand::Validate,
        } => command_config_validate(config_path),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Creates (or resets) the queue schema.
fn command_init(config_path: Option<&Path>, command: &InitCommand) -> CliResult<ExitCode> {
    let config = load_config(config_path)?;
    let store = open_store(&config).map_err(|err| CliError::new(err.to_string()))?;
    if command.reset {
        store.reset().map_err(|err| CliError::new(format!("reset failed: {err}")))?;
    }
    let verb = if command.reset { "reset" } else { "initialized" };
    write_stdout_line(&format!("Lot store {verb}: {}", store.config().path.display()))?;
    Ok(ExitCode::SUCCESS)
}

/// Submits a batch, then drains the queue so the lot is coded on return.
fn command_submit(config_path: Option<&Path>, command: &SubmitCommand) -> CliResult<ExitCode> {
    let config = load_config(config_path)?;
    let certificates = read_certificates(&command.input)?;
    let runtime = open_runtime(&config)?;
    let owner = OwnerId::new(command.owner.clone());
    let uid = runtime
        .service
        .submit(&owner, certificates)
        .map_err(|err| CliError::new(format!("submit failed: {err}")))?;
    write_json(&SubmitOutput {
        uid: &uid,
    })?;
    runtime
        .worker()
        .wait_idle()
        .map_err(|err| CliError::new(format!("worker stopped: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Drains every ready lot in the foreground.
fn command_run(config_path: Option<&Path>) -> CliResult<ExitCode> {
    let config = load_config(config_path)?;
    let runtime = open_runtime(&config)?;
    let outcome = runtime.service.trigger().and_then(|_| runtime.worker().wait_idle());
    let summary = match outcome {
        Ok(processed) => RunSummary {
            processed,
            fault: None,
        },
        Err(fault) => RunSummary {
            processed: runtime.worker().processed(),
            fault: Some(fault.to_string()),
        },
    };
    write_json(&summary)?;
    if summary.fault.is_some() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Polls a lot; pending lots are processed before the command returns.
fn command_recover(config_path: Option<&Path>, command: &RecoverCommand) -> CliResult<ExitCode> {
    let config = load_config(config_path)?;
    let runtime = open_runtime(&config)?;
    let owner = OwnerId::new(command.owner.clone());
    let uid = LotUid::new(command.uid.clone());
    let recovery = runtime
        .service
        .recover(&owner, &uid)
        .map_err(|err| CliError::new(format!("recover failed: {err}")))?;
    write_json(&recovery)?;
    runtime
        .worker()
        .wait_idle()
        .map_err(|err| CliError::new(format!("worker stopped: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Validates the configuration file.
fn command_config_validate(config_path: Option<&Path>) -> CliResult<ExitCode> {
    load_config(config_path)?;
    write_stdout_line("Config valid")?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads and validates the configuration.
fn load_config(path: Option<&Path>) -> CliResult<IrisLotsConfig> {
    IrisLotsConfig::load(path)
        .map_err(|err| CliError::new(format!("Failed to load config: {err}")))
}

/// Assembles the runtime.
fn open_runtime(config: &IrisLotsConfig) -> CliResult<LotRuntime> {
    LotRuntime::open(config).map_err(|err| CliError::new(format!("startup failed: {err}")))
}

/// Reads a certificate batch from a JSON file under the input size limit.
fn read_certificates(path: &Path) -> CliResult<Vec<Certificate>> {
    let bytes = read_bytes_with_limit(path, MAX_INPUT_BYTES)?;
    serde_json::from_slice(&bytes).map_err(|err| {
        CliError::new(format!("invalid certificate input {}: {err}", path.display()))
    })
}

/// Reads a file, rejecting inputs larger than `max_bytes`.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> CliResult<Vec<u8>> {
    let io_error =
        |err: std::io::Error| CliError::new(format!("failed to read {}: {err}", path.display()));
    let file = File::open(path).map_err(io_error)?;
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX);
    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1)).read_to_end(&mut bytes).map_err(io_error)?;
    if bytes.len() > max_bytes {
        return Err(CliError::new(format!(
            "input {} exceeds {max_bytes} bytes",
            path.display()
        )));
    }
    Ok(bytes)
}

/// Serializes a value as one JSON line on stdout.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let line = serde_json::to_string(value)
        .map_err(|err| CliError::new(format!("failed to encode output: {err}")))?;
    write_stdout_line(&line)
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
        .map_err(|err| CliError::new(format!("failed to write to stdout: {err}")))
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
