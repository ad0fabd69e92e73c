//! Tool declarations and tool-call normalization
//!
//! Vendors encode tools in one of a few shapes:
//!
//! - **functions**: `{"type": "function", "function": {name, description, parameters}}`,
//!   calls come back as `{"id", "function": {"name", "arguments": "<json string>"}}`
//! - **flat function** (OpenAI Responses API): the same fields without the
//!   `function` wrapper, calls as `{"type": "function_call", "call_id", "name", "arguments"}`
//! - **native tool use** (Anthropic): `{name, description, input_schema}`, calls as
//!   `{"type": "tool_use", "id", "name", "input"}` with `input` streamed as partial JSON
//! - **function declarations** (Gemini): `{name, description, parameters}` grouped under
//!   `functionDeclarations`, calls as `{"functionCall": {"name", "args"}}` with no id
//!
//! Everything is normalized to [`ToolDefinition`] on the way in and
//! [`ToolCall`] on the way out.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Tool definition for LLM provider
///
/// This describes a tool that the LLM can use, including its name,
/// description, and input schema in JSON Schema format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON schema for the tool's input parameters
    pub input_schema: Value,
}

/// Wire shape a vendor expects for tool declarations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStyle {
    /// `{"type": "function", "function": {...}}`
    Functions,
    /// `{"type": "function", "name", "description", "parameters"}`
    FlatFunction,
    /// `{"name", "description", "input_schema"}`
    NativeToolUse,
    /// `{"name", "description", "parameters"}`
    FunctionDeclaration,
}

impl ToolDefinition {
    /// Create a new tool definition
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Encode this declaration in the given vendor style
    pub fn wrap(&self, style: ToolStyle) -> Value {
        match style {
            ToolStyle::Functions => json!({
                "type": "function",
                "function": {
                    "name": self.name,
                    "description": self.description,
                    "parameters": self.input_schema,
                },
            }),
            ToolStyle::FlatFunction => json!({
                "type": "function",
                "name": self.name,
                "description": self.description,
                "parameters": self.input_schema,
            }),
            ToolStyle::NativeToolUse => json!({
                "name": self.name,
                "description": self.description,
                "input_schema": self.input_schema,
            }),
            ToolStyle::FunctionDeclaration => json!({
                "name": self.name,
                "description": self.description,
                "parameters": self.input_schema,
            }),
        }
    }

    /// Decode a declaration from any supported vendor style
    ///
    /// Returns `None` when the value has no tool name.
    pub fn unwrap(value: &Value) -> Option<Self> {
        let inner = value.get("function").unwrap_or(value);
        let name = inner.get("name")?.as_str()?.to_string();
        let description = inner
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let input_schema = inner
            .get("parameters")
            .or_else(|| inner.get("input_schema"))
            .cloned()
            .unwrap_or_else(|| json!({"type": "object", "properties": {}}));

        Some(Self {
            name,
            description,
            input_schema,
        })
    }
}

/// A normalized tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Vendor id, or a synthetic `call_<uuid>` when the vendor gave none
    pub id: String,
    /// Name of the tool to invoke
    pub name: String,
    /// Arguments object
    pub input: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    /// Fresh id for vendors that omit one
    pub fn synthetic_id() -> String {
        format!("call_{}", uuid::Uuid::new_v4().simple())
    }

    /// Decode a functions-style call
    ///
    /// Accepts `{"id", "function": {"name", "arguments"}}` as well as the
    /// flat Responses shape `{"call_id", "name", "arguments"}` and Gemini's
    /// `{"name", "args"}`. `arguments` may be a JSON string or an object.
    pub fn from_function_call(value: &Value) -> Option<Self> {
        let function = value.get("function").unwrap_or(value);
        let name = function.get("name")?.as_str()?;
        if name.is_empty() {
            return None;
        }

        let arguments = function
            .get("arguments")
            .or_else(|| function.get("args"))
            .unwrap_or(&Value::Null);
        let input = match parse_arguments(arguments) {
            Some(input) => input,
            None => {
                warn!(tool = name, "Dropping tool call with malformed arguments");
                return None;
            }
        };

        let id = ["call_id", "id"]
            .iter()
            .find_map(|key| value.get(*key).and_then(Value::as_str))
            .or_else(|| function.get("id").and_then(Value::as_str))
            .filter(|id| !id.is_empty())
            .map_or_else(Self::synthetic_id, ToString::to_string);

        Some(Self::new(id, name, input))
    }

    /// Decode a native `tool_use` block
    pub fn from_tool_use(value: &Value) -> Option<Self> {
        let name = value.get("name")?.as_str()?;
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map_or_else(Self::synthetic_id, ToString::to_string);
        let input = value
            .get("input")
            .cloned()
            .filter(Value::is_object)
            .unwrap_or_else(|| Value::Object(Map::new()));

        Some(Self::new(id, name, input))
    }

    /// Functions-style encoding (`arguments` as a JSON string)
    pub fn to_function_call(&self) -> Value {
        json!({
            "id": self.id,
            "type": "function",
            "function": {
                "name": self.name,
                "arguments": self.input.to_string(),
            },
        })
    }

    /// Native `tool_use` block encoding
    pub fn to_tool_use(&self) -> Value {
        json!({
            "type": "tool_use",
            "id": self.id,
            "name": self.name,
            "input": self.input,
        })
    }
}

/// Parse a tool-call `arguments` field into an object
///
/// Empty strings and nulls mean "no arguments" and become `{}`.
fn parse_arguments(arguments: &Value) -> Option<Value> {
    match arguments {
        Value::Null => Some(Value::Object(Map::new())),
        Value::String(raw) if raw.trim().is_empty() => Some(Value::Object(Map::new())),
        Value::String(raw) => serde_json::from_str(raw).ok(),
        other => Some(other.clone()),
    }
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Reassembles tool calls whose arguments arrive as partial JSON across frames
///
/// Slots are keyed by the vendor's stream index. A call is released once its
/// name is known and the accumulated arguments parse as complete JSON; a
/// failed parse only means more text is still to come.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    pending: BTreeMap<usize, PartialToolCall>,
    emitted: HashSet<usize>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the opening of a call (or late-arriving id/name for it)
    pub fn start(&mut self, index: usize, id: Option<&str>, name: Option<&str>) {
        if self.emitted.contains(&index) {
            return;
        }
        let slot = self.pending.entry(index).or_default();
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            slot.id = Some(id.to_string());
        }
        if let Some(name) = name.filter(|name| !name.is_empty()) {
            slot.name = Some(name.to_string());
        }
    }

    /// Append an arguments fragment
    pub fn push_arguments(&mut self, index: usize, fragment: &str) {
        if self.emitted.contains(&index) {
            return;
        }
        self.pending
            .entry(index)
            .or_default()
            .arguments
            .push_str(fragment);
    }

    /// Replace the accumulated arguments with the vendor's final text
    pub fn set_arguments(&mut self, index: usize, arguments: &str) {
        if self.emitted.contains(&index) {
            return;
        }
        self.pending.entry(index).or_default().arguments = arguments.to_string();
    }

    /// Release the call at `index` if its arguments are complete JSON
    pub fn try_complete(&mut self, index: usize) -> Option<ToolCall> {
        let slot = self.pending.get(&index)?;
        slot.name.as_ref()?;
        if slot.arguments.trim().is_empty() {
            return None;
        }
        match serde_json::from_str::<Value>(&slot.arguments) {
            Ok(input) => self.release(index, input),
            Err(e) => {
                debug!(index, error = %e, "Tool arguments incomplete, waiting for more");
                None
            }
        }
    }

    /// Release the call at `index` because the vendor closed it
    ///
    /// Empty arguments become `{}`; arguments that still do not parse are
    /// dropped with a warning.
    pub fn finish(&mut self, index: usize) -> Option<ToolCall> {
        let slot = self.pending.get(&index)?;
        slot.name.as_ref()?;
        match parse_arguments(&Value::String(slot.arguments.clone())) {
            Some(input) => self.release(index, input),
            None => {
                warn!(index, "Tool call closed with incomplete arguments");
                self.pending.remove(&index);
                None
            }
        }
    }

    /// Release every open call, in index order
    pub fn finish_all(&mut self) -> Vec<ToolCall> {
        let indexes: Vec<usize> = self.pending.keys().copied().collect();
        indexes
            .into_iter()
            .filter_map(|index| self.finish(index))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Forget all state; called at the start of every send
    pub fn reset(&mut self) {
        self.pending.clear();
        self.emitted.clear();
    }

    fn release(&mut self, index: usize, input: Value) -> Option<ToolCall> {
        let slot = self.pending.remove(&index)?;
        self.emitted.insert(index);
        let name = slot.name?;
        let id = slot.id.unwrap_or_else(ToolCall::synthetic_id);
        Some(ToolCall::new(id, name, input))
    }
}

/// Helper module to build JSON schemas for tools
pub mod schema {
    use serde_json::{Value, json};

    /// Create a JSON schema for an object with properties
    ///
    /// # Example
    ///
    /// ```
    /// use unillm::tools::schema;
    /// use serde_json::json;
    ///
    /// let schema = schema::object(
    ///     json!({
    ///         "city": schema::string("City name"),
    ///         "days": schema::integer("Forecast length"),
    ///     }),
    ///     vec!["city"],
    /// );
    /// assert_eq!(schema["required"][0], "city");
    /// ```
    pub fn object(properties: Value, required: Vec<&str>) -> Value {
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// String property schema
    pub fn string(description: &str) -> Value {
        json!({"type": "string", "description": description})
    }

    /// Number property schema
    pub fn number(description: &str) -> Value {
        json!({"type": "number", "description": description})
    }

    /// Integer property schema
    pub fn integer(description: &str) -> Value {
        json!({"type": "integer", "description": description})
    }

    /// Boolean property schema
    pub fn boolean(description: &str) -> Value {
        json!({"type": "boolean", "description": description})
    }

    /// Enumerated string property schema
    pub fn enumeration(description: &str, values: &[&str]) -> Value {
        json!({"type": "string", "description": description, "enum": values})
    }

    /// Array property schema
    pub fn array(description: &str, items: Value) -> Value {
        json!({"type": "array", "description": description, "items": items})
    }
}
