//! toolwire: JSON-RPC tool server and client over stdio
//!
//! `toolwire serve` publishes the built-in tools on stdin/stdout.
//! `toolwire demo` and `toolwire interactive` spawn a server and drive it.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use toolwire::cli::{self, ClientMode};
use toolwire::config::{self, Config};
use toolwire::mcp::{McpServer, SessionConfig, ToolDispatcher};
use toolwire::tools::builtin_registry;

/// JSON-RPC tool server and client over stdio.
///
/// Runs the built-in tool server, or spawns a server and talks to it.
#[derive(Parser, Debug)]
#[command(name = "toolwire")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "CONFIG_FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Serve the built-in tools on stdin/stdout
    Serve,

    /// Spawn a server and run the demonstration
    Demo {
        /// Server command (defaults to `toolwire serve`)
        #[arg(last = true, value_name = "SERVER_COMMAND")]
        server_command: Vec<String>,
    },

    /// Spawn a server and start an interactive session
    Interactive {
        /// Server command (defaults to `toolwire serve`)
        #[arg(last = true, value_name = "SERVER_COMMAND")]
        server_command: Vec<String>,
    },
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
///
/// Logs go to stderr; stdout carries protocol frames in `serve` mode.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Server argv for the client modes.
///
/// Precedence: the command line, then the config file, then this
/// executable with `serve`.
fn resolve_server_command(
    given: Vec<String>,
    config: &Config,
    config_path: Option<&Path>,
) -> Result<Vec<String>, std::io::Error> {
    if !given.is_empty() {
        return Ok(given);
    }
    if let Some(command) = config.client.server_command.clone() {
        return Ok(command);
    }

    let exe = std::env::current_exe()?;
    let mut command = vec![exe.to_string_lossy().into_owned()];
    if let Some(path) = config_path {
        command.push("--config".to_string());
        command.push(path.to_string_lossy().into_owned());
    }
    command.push("serve".to_string());
    Ok(command)
}

/// Entry point for toolwire.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nDefault config at: {}", default_path.display());
                }
            }
            return ExitCode::FAILURE;
        }
    };

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match args.command {
        Mode::Serve => {
            info!(
                version = env!("CARGO_PKG_VERSION"),
                allowed_paths = ?cfg.server.allowed_paths,
                "Starting toolwire server"
            );

            let dispatcher = ToolDispatcher::new(builtin_registry(&cfg.server));
            let mut server = McpServer::new(dispatcher, SessionConfig::server(&cfg));

            match runtime.block_on(server.run_stdio(cfg.transport.max_frame_bytes)) {
                Ok(()) => {
                    info!("Server shut down gracefully");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!(error = %e, "Server error");
                    ExitCode::FAILURE
                }
            }
        }
        Mode::Demo { server_command } => {
            run_client(&runtime, ClientMode::Demo, server_command, &cfg, config_path)
        }
        Mode::Interactive { server_command } => run_client(
            &runtime,
            ClientMode::Interactive,
            server_command,
            &cfg,
            config_path,
        ),
    }
}

fn run_client(
    runtime: &tokio::runtime::Runtime,
    mode: ClientMode,
    server_command: Vec<String>,
    cfg: &Config,
    config_path: Option<&Path>,
) -> ExitCode {
    let command = match resolve_server_command(server_command, cfg, config_path) {
        Ok(command) => command,
        Err(e) => {
            error!(error = %e, "Cannot determine server command");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(cli::run_client(mode, &command, cfg)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
