//! Interactive client session.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::cli::{arguments, format_tools, render_outcome, CliError};
use crate::mcp::error::{CloseReason, SessionError};
use crate::mcp::ClientSession;

const PROMPT: &str = "mcp> ";

const HELP: &str = "\
=== Available Commands ===
help              - Show this help message
tools             - List available tools
calc <expr>       - Calculate mathematical expression
ls [directory]    - List files in directory
read <filepath>   - Read file contents
write <file> <content> - Write content to file (use quotes for content with spaces)
                        - Example: write hello.txt \"Hello, World!\"
quit              - Exit the client
";

const CALC_USAGE: &str = "Usage: calc <expression>";
const READ_USAGE: &str = "Usage: read <filepath>";
const WRITE_USAGE: &str = "Usage: write <filepath> <content>\n       \
                           write <filepath> \"<content with spaces>\"";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Blank line.
    Empty,
    /// `help`
    Help,
    /// `tools`
    Tools,
    /// `calc <expression>`
    Calc(String),
    /// `ls [directory]`
    List(String),
    /// `read <filepath>`
    Read(String),
    /// `write <filepath> <content>`
    Write {
        /// Target file.
        filepath: String,
        /// Text to write.
        content: String,
    },
    /// `quit`, `exit` or `q`
    Quit,
    /// A known command with missing arguments.
    Usage(&'static str),
    /// Anything else.
    Unknown(String),
}

/// Parses one line of input.
#[must_use]
pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }

    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(word, rest)| (word, rest.trim()));

    match word.to_ascii_lowercase().as_str() {
        "quit" | "exit" | "q" if rest.is_empty() => Command::Quit,
        "help" if rest.is_empty() => Command::Help,
        "tools" if rest.is_empty() => Command::Tools,
        "calc" if rest.is_empty() => Command::Usage(CALC_USAGE),
        "calc" => Command::Calc(rest.to_string()),
        "ls" => Command::List(rest.split_whitespace().next().unwrap_or(".").to_string()),
        "read" if rest.is_empty() => Command::Usage(READ_USAGE),
        "read" => Command::Read(rest.to_string()),
        "write" => {
            let mut args = split_args(rest).into_iter();
            match (args.next(), args.next()) {
                (Some(filepath), Some(first)) => {
                    let content = std::iter::once(first).chain(args).collect::<Vec<_>>();
                    Command::Write {
                        filepath,
                        content: content.join(" "),
                    }
                }
                _ => Command::Usage(WRITE_USAGE),
            }
        }
        _ => Command::Unknown(line.to_string()),
    }
}

/// Splits on whitespace, keeping `'...'` and `"..."` runs together.
///
/// Quotes are removed; an unterminated quote runs to the end of input.
#[must_use]
pub fn split_args(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in input.chars() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => current.push(ch),
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            None if ch.is_whitespace() => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            None => current.push(ch),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }
    args
}

/// What to do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Print this and read the next line.
    Print(String),
    /// Read the next line.
    Continue,
    /// Leave the loop.
    Quit,
}

/// Runs one command against the session.
pub async fn execute(session: &ClientSession, command: Command) -> Step {
    let outcome = match command {
        Command::Empty => return Step::Continue,
        Command::Quit => return Step::Quit,
        Command::Help => return Step::Print(HELP.to_string()),
        Command::Usage(usage) => return Step::Print(usage.to_string()),
        Command::Unknown(line) => {
            return Step::Print(format!(
                "Unknown command: {line}\nType 'help' for available commands"
            ));
        }
        Command::Tools => {
            return Step::Print(match session.list_tools().await {
                Ok(tools) => format_tools(&tools),
                Err(e) => format!("Error: {e}"),
            });
        }
        Command::Calc(expression) => {
            session
                .call_tool("calculate", arguments([("expression", expression.as_str())]))
                .await
        }
        Command::List(directory) => {
            session
                .call_tool("list_files", arguments([("directory", directory.as_str())]))
                .await
        }
        Command::Read(filepath) => {
            session
                .call_tool("read_file", arguments([("filepath", filepath.as_str())]))
                .await
        }
        Command::Write { filepath, content } => {
            let args = arguments([
                ("filepath", filepath.as_str()),
                ("content", content.as_str()),
            ]);
            session.call_tool("write_file", args).await
        }
    };

    Step::Print(render_outcome(&outcome))
}

/// Reads commands from `input` until `quit`, end of input, or the session
/// closes.
///
/// # Errors
///
/// Returns an error if the console fails or the session closes underneath
/// the loop.
pub async fn run<R, W>(session: &ClientSession, input: R, out: &mut W) -> Result<(), CliError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(out, "\n=== Interactive MCP Client Session ===")?;
    writeln!(out, "Type 'help' for available commands, 'quit' to exit")?;

    let mut lines = input.lines();
    loop {
        write!(out, "\n{PROMPT}")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            return Ok(());
        };

        match execute(session, parse_command(&line)).await {
            Step::Print(text) => writeln!(out, "{}", text.trim_end())?,
            Step::Continue => {}
            Step::Quit => return Ok(()),
        }

        if session.state().is_terminal() {
            let reason = session.close_reason().unwrap_or(CloseReason::Shutdown);
            writeln!(out, "Session closed: {reason}")?;
            return Err(SessionError::closed(reason).into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_commands() {
        assert_eq!(parse_command(""), Command::Empty);
        assert_eq!(parse_command("   "), Command::Empty);
        assert_eq!(parse_command("help"), Command::Help);
        assert_eq!(parse_command("TOOLS"), Command::Tools);
        assert_eq!(parse_command("quit"), Command::Quit);
        assert_eq!(parse_command("Exit"), Command::Quit);
        assert_eq!(parse_command("q"), Command::Quit);
    }

    #[test]
    fn parse_calc() {
        assert_eq!(
            parse_command("calc 2 + 3 * 4"),
            Command::Calc("2 + 3 * 4".to_string())
        );
        assert_eq!(parse_command("calc"), Command::Usage(CALC_USAGE));
        assert_eq!(parse_command("calc    "), Command::Usage(CALC_USAGE));
    }

    #[test]
    fn parse_ls_defaults_to_current_directory() {
        assert_eq!(parse_command("ls"), Command::List(".".to_string()));
        assert_eq!(parse_command("ls /tmp"), Command::List("/tmp".to_string()));
    }

    #[test]
    fn parse_read() {
        assert_eq!(
            parse_command("read notes.txt"),
            Command::Read("notes.txt".to_string())
        );
        assert_eq!(parse_command("read"), Command::Usage(READ_USAGE));
    }

    #[test]
    fn parse_write_with_quotes() {
        assert_eq!(
            parse_command("write hello.txt \"Hello, World!\""),
            Command::Write {
                filepath: "hello.txt".to_string(),
                content: "Hello, World!".to_string(),
            }
        );
        assert_eq!(
            parse_command("write 'my file.txt' several loose   words"),
            Command::Write {
                filepath: "my file.txt".to_string(),
                content: "several loose words".to_string(),
            }
        );
        assert_eq!(parse_command("write only-path"), Command::Usage(WRITE_USAGE));
    }

    #[test]
    fn parse_unknown() {
        assert_eq!(
            parse_command("frobnicate now"),
            Command::Unknown("frobnicate now".to_string())
        );
        assert_eq!(
            parse_command("quit please"),
            Command::Unknown("quit please".to_string())
        );
    }

    #[test]
    fn split_args_handles_quotes() {
        assert_eq!(split_args("a b  c"), ["a", "b", "c"]);
        assert_eq!(split_args("\"a b\" 'c d'"), ["a b", "c d"]);
        assert_eq!(split_args("x\"y z\""), ["xy z"]);
        assert_eq!(split_args("'it\"s'"), ["it\"s"]);
        assert_eq!(split_args("\"open ended"), ["open ended"]);
        assert!(split_args("   ").is_empty());
    }
}
