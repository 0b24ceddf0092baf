//! Tool definitions shared between the server and any documentation/UI layer.
//!
//! A tool's canonical identifier is the dotted form `category.operation`
//! (e.g. `directory.create`, `logs.search`). LLM function-calling APIs widely
//! reject dots in function names, so every definition also carries a
//! sanitized `name` where dots are replaced with `__`. The mapping between
//! the two is total and bijective over the set of ids produced by
//! [`sanitize_tool_name`]: no valid id may itself contain `__`.

use serde::{Deserialize, Serialize};

/// Hints a client may use to decide how to treat a tool call (consult before
/// auto-approving, whether retries are safe, etc). Mirrors the kind of
/// annotations MCP-style tool catalogs attach to each entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ToolAnnotations {
    /// The tool only reads state; it never mutates anything observable.
    #[serde(default)]
    pub read_only: bool,
    /// The tool can irreversibly destroy user data or state.
    #[serde(default)]
    pub destructive: bool,
    /// Calling the tool twice with identical arguments has the same effect
    /// as calling it once.
    #[serde(default)]
    pub idempotent: bool,
}

/// A tool as presented to the LLM and to any catalog-browsing surface.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolDefinition {
    /// Canonical dotted id, e.g. `"directory.create"`.
    pub id: String,
    /// Sanitized name safe for function-calling APIs, e.g. `"directory__create"`.
    pub name: String,
    /// Short human-readable description.
    pub description: String,
    /// The id's leading segment (`"directory"` for `"directory.create"`).
    pub category: String,
    /// JSON Schema describing the tool's arguments.
    pub input_schema: serde_json::Value,
    pub annotations: ToolAnnotations,
}

impl ToolDefinition {
    fn new(id: &str, description: &str, input_schema: serde_json::Value, annotations: ToolAnnotations) -> Self {
        let id = id.to_string();
        let name = sanitize_tool_name(&id);
        let category = category_of(&id).to_string();
        Self {
            id,
            name,
            description: description.to_string(),
            category,
            input_schema,
            annotations,
        }
    }
}

/// Replace every `.` in a dotted tool id with `__`.
///
/// Panics in debug builds if `id` already contains `__`, since that would
/// make the mapping non-injective; callers only ever pass ids from this
/// module's own constructors, so the assumption holds for any id a handler
/// registry will actually see.
pub fn sanitize_tool_name(id: &str) -> String {
    debug_assert!(!id.contains("__"), "tool id {id:?} already contains `__`");
    id.replace('.', "__")
}

/// Inverse of [`sanitize_tool_name`]: replace `__` with `.`.
pub fn unsanitize_tool_name(name: &str) -> String {
    name.replace("__", ".")
}

fn category_of(id: &str) -> &str {
    id.split_once('.').map_or(id, |(category, _)| category)
}

/// The one tool definition this registry ships that has no client-side
/// side effect: a structured scratchpad the model can call to think before
/// acting. Every other concrete tool (filesystem, shell, HTTP, search, ...)
/// is a client-side collaborator outside this crate's scope; handlers for
/// them are registered by the embedding application, not here.
fn think_tool() -> ToolDefinition {
    ToolDefinition::new(
        "agent.think",
        "Think through a problem step by step before acting. Has no side effects.",
        serde_json::json!({
            "type": "object",
            "required": ["thought"],
            "properties": {
                "thought": {
                    "type": "string",
                    "description": "Your step-by-step reasoning or plan"
                }
            }
        }),
        ToolAnnotations {
            read_only: true,
            destructive: false,
            idempotent: true,
        },
    )
}

/// The default tool catalog. Concrete client-side tools are added to this
/// set at runtime by the embedding application; this function only seeds
/// the handful of tools that are meaningful with no client at all.
pub fn default_tools() -> Vec<ToolDefinition> {
    vec![think_tool()]
}
