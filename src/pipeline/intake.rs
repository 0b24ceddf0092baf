//! Intake / Receptionist (`spec.md` §4.E.1). Gathers client-side context,
//! classifies the incoming message, and for substantive requests runs a
//! globally-serialized receptionist tool loop to prime memory before the
//! planner starts. Grounded on `server/yjs.rs::SaveQueue`'s single-actor-
//! over-shared-state idiom, generalized from a debounced batch flush to a
//! plain mutual-exclusion lock — the receptionist has nothing to batch, it
//! just must never run two-at-once.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::agent::{AgentEvent, LoopConfig, LoopContext, ToolLoop};
use crate::bridge::ToolBridge;
use crate::error::Result;
use crate::workspace::AgentWorkspace;

/// Client-side context gathered before planning (`spec.md` §4.E.1): memory
/// index, recent conversation, active tasks, tool manifest, identity
/// skeleton, user personas, user-defined councils.
#[derive(Debug, Clone, Default)]
pub struct IntakeContext {
    pub memory_index: Value,
    pub recent_conversation: Value,
    pub active_tasks: Value,
    pub tool_manifest: Value,
    pub identity: Value,
    pub personas: Value,
    pub councils: Value,
}

/// Whether a message needs the full receptionist/planner treatment or a
/// short-path direct reply (`spec.md` §4.E.1 classify step).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    ShortPath,
    Substantive,
}

const SUBSTANTIVE_VERBS: [&str; 9] = ["create", "build", "plan", "research", "find", "schedule", "organize", "write", "book"];
const SUBSTANTIVE_WORD_COUNT: usize = 20;

/// A conservative length/keyword heuristic standing in for the production
/// classifier's LLM call: anything short and imperative-free is a short
/// path, everything else runs the full pipeline.
pub fn classify_message(message: &str) -> MessageClass {
    let lower = message.to_lowercase();
    let word_count = message.split_whitespace().count();
    if word_count > SUBSTANTIVE_WORD_COUNT || SUBSTANTIVE_VERBS.iter().any(|v| lower.contains(v)) {
        MessageClass::Substantive
    } else {
        MessageClass::ShortPath
    }
}

/// Output of one intake run.
pub struct IntakeResult {
    pub agent_id: String,
    pub workspace: AgentWorkspace,
    pub intake_knowledge: String,
}

/// The FIFO receptionist gate: only one receptionist run proceeds at a
/// time, globally, because it mutates shared memory models (`spec.md`
/// §4.E.1, §5).
pub struct Receptionist {
    bridge: Arc<ToolBridge>,
    fifo: Mutex<()>,
}

impl Receptionist {
    pub fn new(bridge: Arc<ToolBridge>) -> Self {
        Self { bridge, fifo: Mutex::new(()) }
    }

    /// Gathers context via (B), creates the new agent's workspace, and for
    /// substantive messages runs the receptionist tool loop under the
    /// global FIFO lock. Writes `intake_knowledge.md` regardless of class.
    pub async fn run(&self, tool_loop: Arc<ToolLoop>, message: &str, loop_config: LoopConfig) -> Result<IntakeResult> {
        let agent_id = Uuid::new_v4().to_string();
        let workspace = AgentWorkspace::new(self.bridge.clone(), &agent_id);
        workspace.create_workspace().await?;

        let context = self.gather_context().await;

        let intake_knowledge = match classify_message(message) {
            MessageClass::ShortPath => format!("Short-path message; no receptionist run.\n\nRequest: {message}"),
            MessageClass::Substantive => {
                let _fifo_guard = self.fifo.lock().await;
                self.run_receptionist_loop(tool_loop, message, &context, loop_config).await?
            }
        };

        workspace.write_file_at_root("intake_knowledge.md", &intake_knowledge).await?;

        Ok(IntakeResult { agent_id, workspace, intake_knowledge })
    }

    async fn gather_context(&self) -> IntakeContext {
        IntakeContext {
            memory_index: self.bridge.memory(serde_json::json!({ "op": "index" })).await.unwrap_or(Value::Null),
            recent_conversation: self.bridge.memory(serde_json::json!({ "op": "recent_conversation" })).await.unwrap_or(Value::Null),
            active_tasks: self.bridge.memory(serde_json::json!({ "op": "active_tasks" })).await.unwrap_or(Value::Null),
            tool_manifest: self.bridge.tool_manifest(serde_json::json!({})).await.unwrap_or(Value::Null),
            identity: self.bridge.memory(serde_json::json!({ "op": "identity" })).await.unwrap_or(Value::Null),
            personas: self.bridge.persona(serde_json::json!({})).await.unwrap_or(Value::Null),
            councils: self.bridge.council(serde_json::json!({})).await.unwrap_or(Value::Null),
        }
    }

    /// Runs a short tool loop whose only job is to prime memory and search
    /// for relevant files/web/prediction-market context; its final content
    /// becomes `intake_knowledge.md`.
    async fn run_receptionist_loop(
        &self,
        tool_loop: Arc<ToolLoop>,
        message: &str,
        context: &IntakeContext,
        loop_config: LoopConfig,
    ) -> Result<String> {
        let messages = vec![
            serde_json::json!({
                "role": "system",
                "content": "You are the receptionist. Prime memory and search for files, web results, or prediction-market data relevant to the user's request below. Summarize what you find; do not take action on the user's behalf.",
            }),
            serde_json::json!({
                "role": "user",
                "content": format!("Request: {message}\n\nKnown context: {context:?}"),
            }),
        ];

        let ctx = Arc::new(LoopContext::new());
        let mut stream = tool_loop.run(messages, Vec::new(), loop_config, ctx);
        let mut summary = String::new();
        while let Some(event) = stream.next().await {
            if let AgentEvent::Done { outcome } = event {
                summary = outcome.final_content;
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_messages_classify_as_short_path() {
        assert_eq!(classify_message("what time is it"), MessageClass::ShortPath);
    }

    #[test]
    fn imperative_verbs_classify_as_substantive() {
        assert_eq!(classify_message("research flight prices to Tokyo next month"), MessageClass::Substantive);
    }

    #[test]
    fn long_messages_classify_as_substantive_regardless_of_wording() {
        let message = "so ".repeat(25);
        assert_eq!(classify_message(&message), MessageClass::Substantive);
    }
}
