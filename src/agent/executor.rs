//! Tool call execution for the tool loop (`spec.md` §4.C step 7). Grounded
//! on `agent/executor.rs::execute_single`'s timeout-wrapped dispatch and
//! tracing density, generalized from a fixed `ToolExecutor` over a static
//! tool set to a registry of named handlers that the pipeline grows at
//! runtime (`agent__request_tools`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conduit_registry::tools::ToolDefinition;
use serde_json::Value;
use tokio::time::timeout;

use crate::bridge::protocol::ExecutionCommand;
use crate::bridge::ToolBridge;
use crate::error::Error;
use crate::llm::ToolCallRequest;

/// Outcome of executing one [`ToolCallRequest`].
#[derive(Debug, Clone)]
pub struct ToolCallOutcome {
    pub id: String,
    pub name: String,
    pub success: bool,
    pub result: Value,
    /// The handler's error text matched an infrastructure-loss phrase
    /// (`spec.md` §4.C step 7); short-circuits the active batch and loop.
    pub infrastructure_down: bool,
    /// The handler asked for the remaining batch to be skipped.
    pub break_batch: bool,
}

impl ToolCallOutcome {
    fn unknown(call: &ToolCallRequest) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            success: false,
            result: serde_json::json!({ "error": format!("Unknown tool: {}", call.name) }),
            infrastructure_down: false,
            break_batch: false,
        }
    }

    fn skipped(call: &ToolCallRequest) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            success: false,
            result: serde_json::json!({ "error": "Skipped — batch interrupted" }),
            infrastructure_down: false,
            break_batch: false,
        }
    }

    fn failure(call: &ToolCallRequest, error: Error) -> Self {
        let infrastructure_down = matches!(error, Error::InfrastructureDown(_));
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            success: false,
            result: serde_json::json!({ "error": error.to_string() }),
            infrastructure_down,
            break_batch: false,
        }
    }
}

/// A callable tool, dispatched by name. Most calls are forwarded to the
/// connected device; a handful of synthetic tools (`agent::synthetic`) are
/// resolved entirely server-side and never reach this trait.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Value) -> std::result::Result<Value, Error>;
}

/// Forwards every call to the connected device as an `execution_request`.
pub struct BridgeToolHandler {
    pub bridge: Arc<ToolBridge>,
    pub tool_id: String,
    pub timeout_ms: u64,
}

#[async_trait]
impl ToolHandler for BridgeToolHandler {
    async fn call(&self, args: Value) -> std::result::Result<Value, Error> {
        self.bridge
            .execution(ExecutionCommand {
                id: uuid::Uuid::nil(),
                tool_id: self.tool_id.clone(),
                tool_args: args,
                timeout_ms: self.timeout_ms,
                sandboxed: false,
                requires_approval: false,
                dry_run: false,
            })
            .await
    }
}

struct Entry {
    handler: Arc<dyn ToolHandler>,
    definition: ToolDefinition,
}

/// The active tool set for one tool loop run, keyed by the LLM-facing
/// sanitized name (`conduit_registry::tools::sanitize_tool_name`).
pub struct ToolRegistry {
    entries: HashMap<String, Entry>,
    bridge: Arc<ToolBridge>,
    tool_timeout: Duration,
}

impl ToolRegistry {
    pub fn new(bridge: Arc<ToolBridge>, tool_timeout: Duration) -> Self {
        Self { entries: HashMap::new(), bridge, tool_timeout }
    }

    /// Registers a tool whose execution is forwarded to the device.
    pub fn register_bridge_tool(&mut self, definition: ToolDefinition) {
        let handler = Arc::new(BridgeToolHandler {
            bridge: self.bridge.clone(),
            tool_id: definition.id.clone(),
            timeout_ms: self.tool_timeout.as_millis() as u64,
        });
        self.entries.insert(definition.name.clone(), Entry { handler, definition });
    }

    /// Registers a server-resolved handler (used for non-bridge tools such
    /// as the workspace-backed `think` tool).
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>, definition: ToolDefinition) {
        self.entries.insert(definition.name.clone(), Entry { handler, definition });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Whether a successful call to `name` counts as a mutating action for
    /// the Dot-persona mutation/verification flag (`spec.md` §4.C step 9):
    /// any tool not marked `read_only` in the registry.
    pub fn is_mutating(&self, name: &str) -> bool {
        self.entries.get(name).map(|e| !e.definition.annotations.read_only).unwrap_or(false)
    }

    /// Whether a call to `name` counts as a verification step: any
    /// `read_only` tool.
    pub fn is_verification(&self, name: &str) -> bool {
        self.entries.get(name).map(|e| e.definition.annotations.read_only).unwrap_or(false)
    }

    /// Tool definitions in OpenAI function-calling format.
    pub fn tool_definitions(&self) -> Vec<Value> {
        self.entries
            .values()
            .map(|e| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": e.definition.name,
                        "description": e.definition.description,
                        "parameters": e.definition.input_schema,
                    }
                })
            })
            .collect()
    }

    /// Executes one call, classifying `Unknown tool` per step 7.
    pub async fn execute_one(&self, call: &ToolCallRequest, tool_timeout: Duration) -> ToolCallOutcome {
        let Some(entry) = self.entries.get(&call.name) else {
            return ToolCallOutcome::unknown(call);
        };

        tracing::info!(tool_call_id = %call.id, tool_name = %call.name, "executing tool");

        match timeout(tool_timeout, entry.handler.call(call.arguments.clone())).await {
            Ok(Ok(result)) => {
                tracing::info!(tool_call_id = %call.id, "tool execution completed");
                ToolCallOutcome {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    success: true,
                    result,
                    infrastructure_down: false,
                    break_batch: false,
                }
            }
            Ok(Err(err)) => {
                tracing::warn!(tool_call_id = %call.id, error = %err, "tool execution failed");
                ToolCallOutcome::failure(call, err)
            }
            Err(_) => {
                tracing::warn!(tool_call_id = %call.id, ?tool_timeout, "tool execution timed out");
                ToolCallOutcome::failure(call, Error::Timeout(format!("tool {} timed out", call.name)))
            }
        }
    }

    /// Executes a full batch **in order**, filling the remaining calls with
    /// `"Skipped — batch interrupted"` placeholders once a call signals
    /// infrastructure loss or asks to break the batch.
    pub async fn execute_batch(&self, calls: &[ToolCallRequest], tool_timeout: Duration) -> Vec<ToolCallOutcome> {
        let mut outcomes = Vec::with_capacity(calls.len());
        let mut short_circuit = false;

        for call in calls {
            if short_circuit {
                outcomes.push(ToolCallOutcome::skipped(call));
                continue;
            }
            let outcome = self.execute_one(call, tool_timeout).await;
            short_circuit = outcome.infrastructure_down || outcome.break_batch;
            outcomes.push(outcome);
        }

        outcomes
    }
}

/// Builds the LLM-facing `{role: tool, ...}` reply message for one outcome.
pub fn tool_result_message(outcome: &ToolCallOutcome) -> Value {
    serde_json::json!({
        "role": "tool",
        "tool_call_id": outcome.id,
        "content": outcome.result.to_string(),
    })
}

/// Builds the assistant message carrying the model's tool call batch.
pub fn assistant_tool_message(content: &str, tool_calls: &[ToolCallRequest]) -> Value {
    serde_json::json!({
        "role": "assistant",
        "content": if content.is_empty() { Value::Null } else { Value::String(content.to_string()) },
        "tool_calls": tool_calls.iter().map(|tc| {
            serde_json::json!({
                "id": tc.id,
                "type": "function",
                "function": {
                    "name": tc.name,
                    "arguments": tc.arguments.to_string(),
                }
            })
        }).collect::<Vec<_>>(),
    })
}
