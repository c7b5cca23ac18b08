//! Command-line client: spawns a server, connects, and runs the demo or an
//! interactive session against it.

pub mod demo;
pub mod repl;

use std::io::{self, Write};

use serde_json::Value;
use thiserror::Error;
use tokio::io::BufReader;

use crate::config::Config;
use crate::mcp::error::{SessionError, TransportError};
use crate::mcp::process::ServerProcess;
use crate::mcp::registry::Arguments;
use crate::mcp::session::SessionConfig;
use crate::mcp::transport::Transport;
use crate::mcp::types::{ToolCallResult, ToolDescriptor};
use crate::mcp::ClientSession;

/// Errors surfaced by the client commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The server process could not be started.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The session failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Reading the console or writing to it failed.
    #[error("console I/O failed: {0}")]
    Console(#[from] io::Error),
}

/// What the client does once connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMode {
    /// Run the scripted demo.
    Demo,
    /// Read commands from stdin.
    Interactive,
}

/// Spawns `command`, runs `mode` against it, and stops the process.
///
/// # Errors
///
/// Returns an error if the server cannot be spawned, the handshake fails,
/// or the session closes unexpectedly.
pub async fn run_client(
    mode: ClientMode,
    command: &[String],
    config: &Config,
) -> Result<(), CliError> {
    println!("Connecting to server with command: {}", command.join(" "));

    let (process, transport) = ServerProcess::spawn(command, config.transport.max_frame_bytes)?;
    let result = run_session(mode, transport, config).await;

    match process.stop(config.client.shutdown_grace()).await {
        Ok(status) if !status.success() => {
            tracing::warn!(%status, "Server process exited with failure");
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to stop server process"),
    }

    result
}

async fn run_session(
    mode: ClientMode,
    transport: Transport,
    config: &Config,
) -> Result<(), CliError> {
    let session = ClientSession::connect(transport, SessionConfig::client(config)).await?;
    let server = session.server_info();
    println!("Connected to {} {}", server.name, server.version);

    let result = drive(&session, mode).await;
    session.shutdown().await;
    result
}

async fn drive(session: &ClientSession, mode: ClientMode) -> Result<(), CliError> {
    let mut stdout = io::stdout();
    let tools = session.list_tools().await?;
    writeln!(stdout, "{}", format_tools(&tools))?;

    match mode {
        ClientMode::Demo => demo::run(session, ".", &mut stdout).await,
        ClientMode::Interactive => {
            let stdin = BufReader::new(tokio::io::stdin());
            repl::run(session, stdin, &mut stdout).await
        }
    }
}

/// Renders a tool list for the console.
#[must_use]
pub fn format_tools(tools: &[ToolDescriptor]) -> String {
    let mut out = String::from("\n=== Available Tools ===");
    for tool in tools {
        out.push_str(&format!("\n• {}: {}", tool.name, tool.description));
    }
    out
}

/// Renders the outcome of a tool call for the console.
#[must_use]
pub fn render_outcome(outcome: &Result<ToolCallResult, SessionError>) -> String {
    match outcome {
        Ok(result) if result.is_failure() => format!("Error: {}", result.text()),
        Ok(result) => {
            let text = result.text();
            if text.is_empty() {
                "No content returned".to_string()
            } else {
                text
            }
        }
        Err(e) => format!("Error: {e}"),
    }
}

/// Builds string arguments for a tool call.
pub(crate) fn arguments<const N: usize>(pairs: [(&str, &str); N]) -> Arguments {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
        .collect()
}
