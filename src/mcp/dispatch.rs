//! Tool dispatch.
//!
//! [`ToolDispatcher::dispatch`] never fails: unknown tools, invalid
//! arguments, handler errors and handler panics all become failure
//! outcomes inside an ordinary [`ToolCallResult`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::mcp::registry::{Arguments, ToolRegistry};
use crate::mcp::types::{ParameterSchema, ToolCallResult};

/// Routes tool calls to registered handlers.
#[derive(Debug, Clone, Default)]
pub struct ToolDispatcher {
    registry: ToolRegistry,
}

impl ToolDispatcher {
    /// Creates a dispatcher over `registry`.
    #[must_use]
    pub const fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// The underlying registry.
    #[must_use]
    pub const fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Mutable access for late registrations.
    pub fn registry_mut(&mut self) -> &mut ToolRegistry {
        &mut self.registry
    }

    /// Validates `args` against the tool's schema and invokes its handler.
    #[must_use]
    pub fn dispatch(&self, name: &str, args: &Arguments) -> ToolCallResult {
        let Some(tool) = self.registry.get(name) else {
            tracing::debug!(tool = %name, "Call to unknown tool");
            return ToolCallResult::failure(format!("unknown tool: {name}"));
        };

        let args = match validate_arguments(&tool.descriptor.parameters, args) {
            Ok(args) => args,
            Err(message) => {
                tracing::debug!(tool = %name, %message, "Rejected tool arguments");
                return ToolCallResult::failure(message);
            }
        };

        let handler = &tool.handler;
        match panic::catch_unwind(AssertUnwindSafe(|| handler.call(&args))) {
            Ok(Ok(text)) => ToolCallResult::success(text),
            Ok(Err(e)) => {
                tracing::debug!(tool = %name, error = %e, "Tool reported failure");
                ToolCallResult::failure(e.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(tool = %name, %message, "Tool handler panicked");
                ToolCallResult::failure(format!("tool '{name}' panicked: {message}"))
            }
        }
    }
}

/// Checks required parameters and types, and fills in declared defaults.
///
/// Parameters not named in the schema pass through unchanged. An explicit
/// `null` for an optional parameter counts as omitted.
///
/// # Errors
///
/// Returns a message naming the first missing or mistyped parameter.
pub fn validate_arguments(
    schema: &ParameterSchema,
    args: &Arguments,
) -> Result<Arguments, String> {
    let mut validated = args.clone();

    for (name, spec) in schema.iter() {
        match args.get(name) {
            Some(value) if !(value.is_null() && !spec.required) => {
                if !spec.kind.accepts(value) {
                    return Err(format!(
                        "parameter '{name}' must be {}",
                        spec.kind.describe()
                    ));
                }
            }
            _ if spec.required => {
                return Err(format!("missing required parameter '{name}'"));
            }
            _ => {
                validated.remove(name);
                if let Some(ref default) = spec.default {
                    validated.insert(name.to_string(), default.clone());
                }
            }
        }
    }

    Ok(validated)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::mcp::types::{ParamType, ToolDescriptor};
    use serde_json::{json, Value};

    fn args(value: Value) -> Arguments {
        match value {
            Value::Object(map) => map,
            _ => panic!("test arguments must be an object"),
        }
    }

    fn dispatcher() -> ToolDispatcher {
        let mut registry = ToolRegistry::new();
        registry.register_fn(
            ToolDescriptor::new(
                "echo",
                "Echo text",
                ParameterSchema::new().required("text", ParamType::String, "Text to echo"),
            ),
            |args| Ok(args["text"].as_str().unwrap_or_default().to_string()),
        );
        registry.register_fn(
            ToolDescriptor::new(
                "greet",
                "Greet someone",
                ParameterSchema::new().optional(
                    "name",
                    ParamType::String,
                    "Who to greet",
                    Some(json!("world")),
                ),
            ),
            |args| Ok(format!("hello {}", args["name"].as_str().unwrap_or("?"))),
        );
        registry.register_fn(
            ToolDescriptor::new("fail", "Always fails", ParameterSchema::new()),
            |_| Err(ToolError::failed("disk on fire")),
        );
        registry.register_fn(
            ToolDescriptor::new("explode", "Panics", ParameterSchema::new()),
            |_| panic!("boom"),
        );
        ToolDispatcher::new(registry)
    }

    #[test]
    fn dispatch_success() {
        let result = dispatcher().dispatch("echo", &args(json!({"text": "hi"})));
        assert_eq!(result, ToolCallResult::success("hi"));
    }

    #[test]
    fn dispatch_unknown_tool() {
        let result = dispatcher().dispatch("missing", &Arguments::new());
        assert!(result.is_failure());
        assert_eq!(result.text(), "unknown tool: missing");
    }

    #[test]
    fn dispatch_missing_required_parameter() {
        let result = dispatcher().dispatch("echo", &Arguments::new());
        assert!(result.is_failure());
        assert_eq!(result.text(), "missing required parameter 'text'");
    }

    #[test]
    fn dispatch_type_mismatch() {
        let result = dispatcher().dispatch("echo", &args(json!({"text": 5})));
        assert!(result.is_failure());
        assert_eq!(result.text(), "parameter 'text' must be a string");
    }

    #[test]
    fn dispatch_applies_defaults() {
        let d = dispatcher();
        assert_eq!(d.dispatch("greet", &Arguments::new()).text(), "hello world");
        assert_eq!(
            d.dispatch("greet", &args(json!({"name": null}))).text(),
            "hello world"
        );
        assert_eq!(
            d.dispatch("greet", &args(json!({"name": "bob"}))).text(),
            "hello bob"
        );
    }

    #[test]
    fn dispatch_handler_error_becomes_failure() {
        let result = dispatcher().dispatch("fail", &Arguments::new());
        assert!(result.is_failure());
        assert_eq!(result.text(), "disk on fire");
    }

    #[test]
    fn dispatch_handler_panic_becomes_failure() {
        let result = dispatcher().dispatch("explode", &Arguments::new());
        assert!(result.is_failure());
        assert!(result.text().contains("boom"));
    }

    #[test]
    fn extra_arguments_pass_through() {
        let schema = ParameterSchema::new().required("a", ParamType::Integer, "A");
        let validated = validate_arguments(&schema, &args(json!({"a": 1, "b": true}))).unwrap();
        assert_eq!(validated["b"], json!(true));
    }
}
