//! Built-in tools served by `toolwire serve`.
//!
//! | Tool | Parameters | Result |
//! |------|------------|--------|
//! | `calculate` | `expression` | `Result: <expression> = <value>` |
//! | `list_files` | `directory` (default `.`) | one line per entry |
//! | `read_file` | `filepath` | the file's text |
//! | `write_file` | `filepath`, `content` | characters written |
//! | `echo` | `text` | the text unchanged |

pub mod calc;
pub mod fs;

use serde_json::{json, Value};

use crate::config::ServerConfig;
use crate::error::ToolError;
use crate::mcp::registry::{Arguments, ToolRegistry};
use crate::mcp::types::{ParamType, ParameterSchema, ToolDescriptor};

use self::fs::PathPolicy;

/// Builds a registry holding every built-in tool.
#[must_use]
pub fn builtin_registry(config: &ServerConfig) -> ToolRegistry {
    let policy = PathPolicy::new(config.allowed_paths.clone());
    let max_read_bytes = config.max_read_bytes;
    let mut registry = ToolRegistry::new();

    registry.register_fn(
        ToolDescriptor::new(
            "calculate",
            "Perform basic mathematical calculations",
            ParameterSchema::new().required(
                "expression",
                ParamType::String,
                "Mathematical expression to evaluate (e.g., '2 + 3 * 4')",
            ),
        ),
        calculate,
    );

    let list_policy = policy.clone();
    registry.register_fn(
        ToolDescriptor::new(
            "list_files",
            "List files in a directory",
            ParameterSchema::new().optional(
                "directory",
                ParamType::String,
                "Directory path to list files from (defaults to current directory)",
                Some(json!(".")),
            ),
        ),
        move |args| fs::list_files(&list_policy, string_arg(args, "directory")?),
    );

    let read_policy = policy.clone();
    registry.register_fn(
        ToolDescriptor::new(
            "read_file",
            "Read contents of a text file",
            ParameterSchema::new().required(
                "filepath",
                ParamType::String,
                "Path to the file to read",
            ),
        ),
        move |args| fs::read_file(&read_policy, string_arg(args, "filepath")?, max_read_bytes),
    );

    registry.register_fn(
        ToolDescriptor::new(
            "write_file",
            "Write content to a text file",
            ParameterSchema::new()
                .required("filepath", ParamType::String, "Path to the file to write")
                .required("content", ParamType::String, "Content to write to the file"),
        ),
        move |args| {
            fs::write_file(
                &policy,
                string_arg(args, "filepath")?,
                string_arg(args, "content")?,
            )
        },
    );

    registry.register_fn(
        ToolDescriptor::new(
            "echo",
            "Return the given text unchanged",
            ParameterSchema::new().required("text", ParamType::String, "Text to echo"),
        ),
        |args| string_arg(args, "text").map(ToString::to_string),
    );

    registry
}

fn calculate(args: &Arguments) -> Result<String, ToolError> {
    let expression = string_arg(args, "expression")?;
    let value = calc::evaluate(expression)?;
    Ok(format!(
        "Result: {expression} = {}",
        calc::format_number(value)
    ))
}

fn string_arg<'a>(args: &'a Arguments, name: &str) -> Result<&'a str, ToolError> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArgument {
            name: name.to_string(),
            message: "expected a string".to_string(),
        })
}
