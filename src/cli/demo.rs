//! Scripted walk through the built-in tools.

use std::io::Write;
use std::path::Path;

use crate::cli::{arguments, render_outcome, CliError};
use crate::mcp::error::SessionError;
use crate::mcp::registry::Arguments;
use crate::mcp::session::SessionState;
use crate::mcp::types::ToolCallResult;
use crate::mcp::ClientSession;

/// Expressions sent to `calculate`.
pub const EXPRESSIONS: [&str; 4] = ["2 + 3 * 4", "sqrt(16)", "pi * 2", "sin(pi/2)"];

/// Name of the file the demo writes and reads back.
pub const DEMO_FILE: &str = "test_file.txt";

/// Content written to [`DEMO_FILE`].
pub const DEMO_CONTENT: &str = "Hello from MCP Client!\nThis is a test file.";

/// Runs the demo against `session`, listing `directory` and writing
/// [`DEMO_FILE`] inside it.
///
/// # Errors
///
/// Returns an error if the session closes or the console fails. Tool
/// failures are printed and the demo carries on.
pub async fn run<W: Write>(
    session: &ClientSession,
    directory: &str,
    out: &mut W,
) -> Result<(), CliError> {
    writeln!(out, "\n=== MCP Client Demo ===")?;

    writeln!(out, "\n1. Mathematical calculations:")?;
    for expression in EXPRESSIONS {
        let args = arguments([("expression", expression)]);
        let result = call(session, "calculate", args).await?;
        writeln!(out, "  {expression} = {result}")?;
    }

    writeln!(out, "\n2. File operations:")?;

    let args = arguments([("directory", directory)]);
    let result = call(session, "list_files", args).await?;
    writeln!(out, "  Current directory contents:\n  {result}")?;

    let filepath = demo_path(directory);
    let args = arguments([("filepath", filepath.as_str()), ("content", DEMO_CONTENT)]);
    let result = call(session, "write_file", args).await?;
    writeln!(out, "  Write result: {result}")?;

    let args = arguments([("filepath", filepath.as_str())]);
    let result = call(session, "read_file", args).await?;
    writeln!(out, "  Read result: {result}")?;

    writeln!(out, "\nDemo completed!")?;
    Ok(())
}

fn demo_path(directory: &str) -> String {
    if directory == "." {
        DEMO_FILE.to_string()
    } else {
        Path::new(directory)
            .join(DEMO_FILE)
            .to_string_lossy()
            .into_owned()
    }
}

/// Calls a tool and renders the outcome. Only a closed session is an error.
async fn call(
    session: &ClientSession,
    name: &str,
    arguments: Arguments,
) -> Result<String, SessionError> {
    let outcome: Result<ToolCallResult, SessionError> = session.call_tool(name, arguments).await;
    match outcome {
        Err(e) if ends_demo(&e, session.state()) => Err(e),
        outcome => Ok(render_outcome(&outcome)),
    }
}

/// A failed call stops the demo only once the session itself is gone.
fn ends_demo(error: &SessionError, state: SessionState) -> bool {
    matches!(error, SessionError::Closed { .. }) || state.is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::error::{CloseReason, CodecError};

    #[test]
    fn demo_path_in_current_directory() {
        assert_eq!(demo_path("."), "test_file.txt");
    }

    #[test]
    fn demo_path_in_other_directory() {
        let expected = Path::new("/tmp/work").join("test_file.txt");
        assert_eq!(demo_path("/tmp/work"), expected.to_string_lossy());
    }

    #[test]
    fn local_failures_do_not_end_demo() {
        let encode = SessionError::Malformed(CodecError::NotAnObject);
        assert!(!ends_demo(&encode, SessionState::Ready));

        let rpc = SessionError::Rpc {
            code: -32601,
            message: "Tool not found".to_string(),
        };
        assert!(!ends_demo(&rpc, SessionState::Ready));
    }

    #[test]
    fn closed_session_ends_demo() {
        let closed = SessionError::closed(CloseReason::EndOfStream);
        assert!(ends_demo(&closed, SessionState::Closed));

        let encode = SessionError::Malformed(CodecError::NotAnObject);
        assert!(ends_demo(&encode, SessionState::Closing));
    }
}
