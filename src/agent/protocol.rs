//! Event and result types the tool loop emits (`spec.md` §4.C). Grounded on
//! `agent/protocol.rs`'s tagged-enum convention, generalized from a fixed
//! chat-turn event set to the new iteration contract's extra terminal states
//! (stuck warnings, escalation, synthesis).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Streamed while a tool loop run is in flight; the caller forwards these to
/// whatever transport is driving the run (device bridge, pipeline step).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    TextDelta { content: String },
    ToolCallStart { id: String, name: String },
    ToolCallResult { id: String, name: String, success: bool, result: Value },
    /// A stuck-detection warning escalated the loop (`spec.md` §4.C step 8).
    Stuck { message: String },
    Done { outcome: LoopOutcome },
}

/// One recorded tool call, accumulated in `ctx.state.toolCallsMade`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    pub result: Value,
    pub success: bool,
}

/// Why the loop stopped. `Aborted` and `LlmError` are not among `spec.md`'s
/// four named exit conditions but are required by steps 3 and 5 of the
/// iteration contract ("if aborted, stop immediately"; a failed LLM call has
/// to end the loop somehow) and are recorded as distinct reasons rather than
/// folded into `InfrastructureDown`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExitReason {
    NoToolCalls,
    StoppedByTool { stop_tool_args: Value },
    InfrastructureDown { message: String },
    Escalated { reason: String },
    MaxIterationsSynthesized,
    Aborted,
    LlmError { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopOutcome {
    pub exit_reason: ExitReason,
    pub final_content: String,
    pub tool_calls_made: Vec<ToolCallRecord>,
    pub iterations: u32,
}
