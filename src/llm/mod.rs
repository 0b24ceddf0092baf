//! LLM provider interface (`spec.md` §6 external interfaces). The tool loop
//! calls this trait once per iteration; everything provider-specific
//! (streaming transport, SSE framing, auth headers) lives behind it.
//! Grounded on `llm/client.rs::LLMClient`'s trait-for-abstraction shape.

pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

pub use client::ConduitLlmClient;

/// A tool call the model wants executed, as parsed from the wire response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Why the model stopped generating this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    EndTurn,
    ToolCalls,
    MaxTokens,
    ContentFilter,
}

/// One request to the model: the full message history plus the active tool
/// set (`spec.md` §4.C inputs: `{client, model, maxTokens, messages, tools,
/// ..., temperature}`).
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Value>,
    pub tools: Vec<Value>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug)]
pub struct ChatResult {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub finish_reason: FinishReason,
    pub usage: TokenUsage,
}

/// Incremental events surfaced while a [`ChatRequest`] streams back, so a
/// caller can forward text to a connected client before the turn completes.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    TextDelta(String),
    ToolCallStart { id: String, name: String },
    ToolCallArgsDelta { id: String, delta: String },
}

/// Implemented once per provider; the tool loop only ever calls `chat`.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, request: ChatRequest, emit: &mut (dyn FnMut(ChatEvent) + Send)) -> Result<ChatResult>;
}
