//! Typed payloads carried inside protocol messages.
//!
//! These are the `params` and `result` bodies of the handshake and tool
//! methods, shared by the client and server sessions.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name and version of one side of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    /// Program name.
    pub name: String,
    /// Program version.
    #[serde(default)]
    pub version: String,
}

impl Implementation {
    /// Identifies this crate under the given name.
    #[must_use]
    pub fn this_crate(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<Implementation>,
}

/// Result of the initialize request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Negotiated protocol version.
    pub protocol_version: String,
    /// Server capabilities.
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    /// Server information.
    pub server_info: Implementation,
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolCapabilities>,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: Some(ToolCapabilities::default()),
        }
    }
}

/// Tool-specific capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change during the session.
    #[serde(rename = "listChanged", default, skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // skip_serializing_if takes fn(&T)
const fn is_false(b: &bool) -> bool {
    !*b
}

/// JSON type expected for a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// JSON string.
    String,
    /// JSON number without a fractional part.
    Integer,
    /// Any JSON number.
    Number,
    /// JSON boolean.
    Boolean,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
    /// Unrecognised type name; any value is accepted.
    #[serde(other)]
    Any,
}

impl ParamType {
    /// Returns `true` if `value` has this type.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }

    /// Article-qualified name for error messages.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::Integer => "an integer",
            Self::Number => "a number",
            Self::Boolean => "a boolean",
            Self::Array => "an array",
            Self::Object => "an object",
            Self::Any => "any value",
        }
    }
}

/// One parameter in a tool's schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    /// Expected type.
    pub kind: ParamType,
    /// Whether the caller must supply it.
    pub required: bool,
    /// Human-readable description.
    pub description: Option<String>,
    /// Value substituted when the parameter is omitted.
    pub default: Option<Value>,
}

/// Parameter schema of a tool, in declaration order.
///
/// On the wire this is a JSON Schema object:
/// `{"type": "object", "properties": {...}, "required": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ObjectSchema", into = "ObjectSchema")]
pub struct ParameterSchema {
    params: IndexMap<String, ParamSpec>,
}

impl ParameterSchema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a required parameter.
    #[must_use]
    pub fn required(mut self, name: &str, kind: ParamType, description: &str) -> Self {
        self.params.insert(
            name.to_string(),
            ParamSpec {
                kind,
                required: true,
                description: Some(description.to_string()),
                default: None,
            },
        );
        self
    }

    /// Adds an optional parameter with an optional default.
    #[must_use]
    pub fn optional(
        mut self,
        name: &str,
        kind: ParamType,
        description: &str,
        default: Option<Value>,
    ) -> Self {
        self.params.insert(
            name.to_string(),
            ParamSpec {
                kind,
                required: false,
                description: Some(description.to_string()),
                default,
            },
        );
        self
    }

    /// Looks up one parameter.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.get(name)
    }

    /// Iterates parameters in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamSpec)> {
        self.params.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    /// Number of declared parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns `true` if no parameters are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// JSON Schema wire form of [`ParameterSchema`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ObjectSchema {
    #[serde(rename = "type", default = "object_type")]
    kind: String,
    #[serde(default)]
    properties: IndexMap<String, PropertySchema>,
    #[serde(default)]
    required: Vec<String>,
}

fn object_type() -> String {
    "object".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PropertySchema {
    #[serde(rename = "type", default = "any_type")]
    kind: ParamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<Value>,
}

const fn any_type() -> ParamType {
    ParamType::Any
}

impl From<ObjectSchema> for ParameterSchema {
    fn from(schema: ObjectSchema) -> Self {
        let params = schema
            .properties
            .into_iter()
            .map(|(name, prop)| {
                let required = schema.required.contains(&name);
                let spec = ParamSpec {
                    kind: prop.kind,
                    required,
                    description: prop.description,
                    default: prop.default,
                };
                (name, spec)
            })
            .collect();
        Self { params }
    }
}

impl From<ParameterSchema> for ObjectSchema {
    fn from(schema: ParameterSchema) -> Self {
        let required = schema
            .params
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name.clone())
            .collect();
        let properties = schema
            .params
            .into_iter()
            .map(|(name, spec)| {
                let prop = PropertySchema {
                    kind: spec.kind,
                    description: spec.description,
                    default: spec.default,
                };
                (name, prop)
            })
            .collect();
        Self {
            kind: object_type(),
            properties,
            required,
        }
    }
}

/// A published tool: name, description and parameter schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Parameter schema.
    #[serde(rename = "inputSchema", default)]
    pub parameters: ParameterSchema,
}

impl ToolDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ParameterSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Result of tools/list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    /// Published tools.
    pub tools: Vec<ToolDescriptor>,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// Content item in a tool call result, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
    /// A content kind this implementation does not interpret.
    #[serde(other)]
    Unsupported,
}

/// Result of a tool call: a success payload or a failure outcome.
///
/// A failure here is a normal protocol exchange; it never terminates the
/// session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates a failure outcome.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// Returns `true` for a failure outcome.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.is_error
    }

    /// Concatenates all text items, newline separated.
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|item| match item {
                ToolContent::Text { text } => Some(text.as_str()),
                ToolContent::Unsupported => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Converts into `Ok(text)` or `Err(message)`.
    ///
    /// # Errors
    ///
    /// Returns the failure message for a failure outcome.
    pub fn into_outcome(self) -> Result<String, String> {
        let text = self.text();
        if self.is_error {
            Err(text)
        } else {
            Ok(text)
        }
    }
}
