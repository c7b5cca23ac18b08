//! Capability registries.
//!
//! - [`ToolRegistry`] is the server's set of declared tools and their
//!   handlers. Registering a name that already exists replaces the earlier
//!   entry (last write wins) and keeps its listing position.
//! - [`ToolCatalog`] is the client's cached copy of what the server
//!   published. [`ToolCatalog::update`] replaces it wholesale.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::ToolError;
use crate::mcp::types::ToolDescriptor;

/// Arguments passed to a tool handler.
pub type Arguments = Map<String, Value>;

/// A server-side tool implementation.
///
/// Handlers run synchronously inside the server's dispatch loop; a handler
/// that never returns stalls its session.
pub trait ToolHandler: Send + Sync {
    /// Invokes the tool with validated arguments.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolError`] describing why the tool failed. The
    /// dispatcher reports it as a failure outcome.
    fn call(&self, args: &Arguments) -> Result<String, ToolError>;
}

impl<F> ToolHandler for F
where
    F: Fn(&Arguments) -> Result<String, ToolError> + Send + Sync,
{
    fn call(&self, args: &Arguments) -> Result<String, ToolError> {
        self(args)
    }
}

/// A descriptor paired with its handler.
#[derive(Clone)]
pub struct RegisteredTool {
    /// Published description.
    pub descriptor: ToolDescriptor,
    /// Implementation.
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Server-side tool registry.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, replacing any tool of the same name.
    ///
    /// Returns the descriptor that was replaced, if any.
    pub fn register<H>(
        &mut self,
        descriptor: ToolDescriptor,
        handler: H,
    ) -> Option<ToolDescriptor>
    where
        H: ToolHandler + 'static,
    {
        let name = descriptor.name.clone();
        let entry = RegisteredTool {
            descriptor,
            handler: Arc::new(handler),
        };

        let replaced = self.tools.insert(name.clone(), entry);
        if replaced.is_some() {
            tracing::debug!(tool = %name, "Replaced existing tool registration");
        } else {
            tracing::debug!(tool = %name, "Registered tool");
        }
        replaced.map(|old| old.descriptor)
    }

    /// Registers a closure as a tool handler.
    pub fn register_fn<F>(
        &mut self,
        descriptor: ToolDescriptor,
        handler: F,
    ) -> Option<ToolDescriptor>
    where
        F: Fn(&Arguments) -> Result<String, ToolError> + Send + Sync + 'static,
    {
        self.register(descriptor, handler)
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    /// Returns all descriptors in registration order.
    #[must_use]
    pub fn describe(&self) -> Vec<ToolDescriptor> {
        self.tools
            .values()
            .map(|tool| tool.descriptor.clone())
            .collect()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Client-side cache of discovered tools.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: IndexMap<String, ToolDescriptor>,
}

impl ToolCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the cached set with `tools`.
    pub fn update(&mut self, tools: Vec<ToolDescriptor>) {
        self.tools = tools
            .into_iter()
            .map(|tool| (tool.name.clone(), tool))
            .collect();
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// Returns the cached tools in server order.
    #[must_use]
    pub fn tools(&self) -> Vec<ToolDescriptor> {
        self.tools.values().cloned().collect()
    }

    /// Number of cached tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if nothing has been discovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
