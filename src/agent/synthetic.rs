//! Synthetic tools injected server-side (`spec.md` §4.C "Synthetic tools").
//! Not present on the connected client; resolved here before a call ever
//! reaches the bridge. New logic; dispatch is modeled on
//! `tools/executor.rs::ToolExecutor::execute`'s match-by-name idiom.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::llm::ToolCallRequest;

pub const ESCALATE: &str = "agent__escalate";
pub const REQUEST_TOOLS: &str = "agent__request_tools";
pub const REQUEST_RESEARCH: &str = "agent__request_research";
pub const WAIT_FOR_USER: &str = "agent__wait_for_user";

pub fn is_synthetic(name: &str) -> bool {
    matches!(name, ESCALATE | REQUEST_TOOLS | REQUEST_RESEARCH | WAIT_FOR_USER)
}

/// OpenAI function-calling definitions for the four synthetic tools, added
/// to every tool loop's active set regardless of persona scope.
pub fn tool_definitions() -> Vec<Value> {
    vec![
        serde_json::json!({
            "type": "function",
            "function": {
                "name": ESCALATE,
                "description": "Escalate when the current tool set cannot make progress. Attempts to acquire the needed tools first; only hands off to a human if none can be found.",
                "parameters": {
                    "type": "object",
                    "properties": { "categories": { "type": "array", "items": { "type": "string" } } },
                    "required": ["categories"],
                },
            }
        }),
        serde_json::json!({
            "type": "function",
            "function": {
                "name": REQUEST_TOOLS,
                "description": "Request additional tools by category to be added to the active tool set.",
                "parameters": {
                    "type": "object",
                    "properties": { "categories": { "type": "array", "items": { "type": "string" } } },
                    "required": ["categories"],
                },
            }
        }),
        serde_json::json!({
            "type": "function",
            "function": {
                "name": REQUEST_RESEARCH,
                "description": "Delegate an open-ended research question to a dedicated research pass.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": { "type": "string" },
                        "depth": { "type": "string", "enum": ["shallow", "deep"] },
                        "format": { "type": "string", "enum": ["summary", "detailed"] },
                    },
                    "required": ["query"],
                },
            }
        }),
        serde_json::json!({
            "type": "function",
            "function": {
                "name": WAIT_FOR_USER,
                "description": "Pause and wait for a response from the user before continuing.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "reason": { "type": "string" },
                        "hint": { "type": "string" },
                        "timeout_ms": { "type": "integer" },
                    },
                    "required": ["reason"],
                },
            }
        }),
    ]
}

/// Supervisor callbacks a tool loop run is parameterized over (`spec.md`
/// §4.C inputs: `hooks`). Implemented once per pipeline stage that drives a
/// loop; the loop itself only ever calls these three methods.
#[async_trait]
pub trait LoopHooks: Send + Sync {
    /// Attempts to materialize tools for the given categories; returns the
    /// ids of any tools added to the active set.
    async fn on_request_tools(&self, categories: &[String]) -> Result<Vec<String>>;
    async fn on_request_research(&self, query: &str, depth: &str, format: &str) -> Result<Value>;
    /// Waits (up to `timeout_ms`) for a supervisor/user response.
    async fn on_wait_for_user(&self, reason: &str, hint: &str, timeout_ms: u64) -> Result<String>;
}

/// Side effect a synthetic call has on the loop's own control state, applied
/// by the caller once `handle` returns.
#[derive(Debug, Clone, Default)]
pub struct SyntheticEffect {
    pub escalated: bool,
    pub escalation_reason: Option<String>,
    pub break_batch: bool,
    /// A `user`-role message to append (the `agent__wait_for_user` resolution).
    pub inject_user_message: Option<String>,
    pub newly_added_tools: Vec<String>,
}

fn string_array(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn str_field<'a>(value: &'a Value, key: &str, default: &'a str) -> &'a str {
    value.get(key).and_then(|v| v.as_str()).unwrap_or(default)
}

/// Resolves one synthetic call, returning the tool-result payload to send
/// back to the model plus the effect it has on loop state.
pub async fn handle(call: &ToolCallRequest, hooks: &dyn LoopHooks) -> (Value, SyntheticEffect) {
    match call.name.as_str() {
        ESCALATE => {
            let categories = string_array(&call.arguments, "categories");
            match hooks.on_request_tools(&categories).await {
                Ok(added) if !added.is_empty() => {
                    (serde_json::json!({ "added_tools": added }), SyntheticEffect { newly_added_tools: added, ..Default::default() })
                }
                Ok(_) => {
                    let reason = "no tools available for requested categories".to_string();
                    let effect = SyntheticEffect {
                        escalated: true,
                        escalation_reason: Some(reason.clone()),
                        break_batch: true,
                        ..Default::default()
                    };
                    (serde_json::json!({ "escalated": true, "reason": reason }), effect)
                }
                Err(err) => {
                    let reason = err.to_string();
                    let effect = SyntheticEffect {
                        escalated: true,
                        escalation_reason: Some(reason.clone()),
                        break_batch: true,
                        ..Default::default()
                    };
                    (serde_json::json!({ "escalated": true, "reason": reason }), effect)
                }
            }
        }
        REQUEST_TOOLS => {
            let categories = string_array(&call.arguments, "categories");
            match hooks.on_request_tools(&categories).await {
                Ok(added) => {
                    (serde_json::json!({ "added_tools": added }), SyntheticEffect { newly_added_tools: added, ..Default::default() })
                }
                Err(err) => (serde_json::json!({ "error": err.to_string() }), SyntheticEffect::default()),
            }
        }
        REQUEST_RESEARCH => {
            let query = str_field(&call.arguments, "query", "");
            let depth = str_field(&call.arguments, "depth", "shallow");
            let format = str_field(&call.arguments, "format", "summary");
            match hooks.on_request_research(query, depth, format).await {
                Ok(result) => (result, SyntheticEffect::default()),
                Err(err) => (serde_json::json!({ "error": err.to_string() }), SyntheticEffect::default()),
            }
        }
        WAIT_FOR_USER => {
            let reason = str_field(&call.arguments, "reason", "");
            let hint = str_field(&call.arguments, "hint", "");
            let timeout_ms = call.arguments.get("timeout_ms").and_then(|v| v.as_u64()).unwrap_or(300_000);
            match hooks.on_wait_for_user(reason, hint, timeout_ms).await {
                Ok(response) => {
                    let effect = SyntheticEffect {
                        break_batch: true,
                        inject_user_message: Some(response.clone()),
                        ..Default::default()
                    };
                    (serde_json::json!({ "response": response }), effect)
                }
                Err(err) => {
                    (serde_json::json!({ "error": err.to_string() }), SyntheticEffect { break_batch: true, ..Default::default() })
                }
            }
        }
        other => {
            (serde_json::json!({ "error": format!("not a synthetic tool: {other}") }), SyntheticEffect::default())
        }
    }
}
