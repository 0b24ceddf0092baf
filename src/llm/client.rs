//! Production [`LlmProvider`] implementation: a streaming OpenAI-compatible
//! chat-completions client. Grounded on `llm/client.rs::TollboothClient`
//! (auth/config shape) and `agent/stream.rs::stream_llm_response` (manual
//! SSE line parsing, tool-call accumulation by stream index).

use std::collections::{HashMap, HashSet};
use std::env;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;

use super::{ChatEvent, ChatRequest, ChatResult, FinishReason, LlmProvider, TokenUsage, ToolCallRequest};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct ConduitLlmClient {
    base_url: String,
    user_id: String,
    secret: String,
    client: reqwest::Client,
}

impl ConduitLlmClient {
    /// Reads `LLM_GATEWAY_URL` / `LLM_GATEWAY_USER_ID` / `LLM_GATEWAY_SECRET`.
    pub fn from_env() -> Result<Self> {
        let secret = env::var("LLM_GATEWAY_SECRET")
            .map_err(|_| Error::Configuration("LLM_GATEWAY_SECRET not set in environment".to_string()))?;
        let base_url = env::var("LLM_GATEWAY_URL").unwrap_or_else(|_| {
            tracing::warn!("LLM_GATEWAY_URL not set, using default localhost:9002");
            "http://localhost:9002".to_string()
        });
        let user_id = env::var("LLM_GATEWAY_USER_ID").unwrap_or_else(|_| "system".to_string());
        Ok(Self { base_url, user_id, secret, client: reqwest::Client::new() })
    }

    pub fn new(base_url: impl Into<String>, user_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), user_id: user_id.into(), secret: secret.into(), client: reqwest::Client::new() }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header("X-User-Id", &self.user_id).bearer_auth(&self.secret)
    }

    /// Extended-thinking options for models known to support them.
    fn provider_options(model: &str) -> Option<Value> {
        let supports_thinking =
            model.contains("claude-3") || model.contains("deepseek") || model.contains("o1") || model.contains("o3");
        if supports_thinking {
            Some(serde_json::json!({
                "anthropic": { "thinking": { "type": "enabled", "budget_tokens": 10000 } }
            }))
        } else {
            None
        }
    }
}

#[async_trait]
impl LlmProvider for ConduitLlmClient {
    async fn chat(&self, request: ChatRequest, emit: &mut (dyn FnMut(ChatEvent) + Send)) -> Result<ChatResult> {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": true,
        });
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(request.tools);
            body["tool_choice"] = serde_json::json!("auto");
        }
        if let Some(opts) = Self::provider_options(&request.model) {
            body["provider_options"] = opts;
        }

        let response = self
            .authed(self.client.post(format!("{}/v1/chat/completions", self.base_url)))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(classify_http_error(status, text));
        }

        let mut bytes_stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut content = String::new();
        let mut tool_calls_map: HashMap<i64, (String, String, String)> = HashMap::new();
        let mut tool_calls_started: HashSet<i64> = HashSet::new();
        let mut usage = TokenUsage::default();
        let mut finish_reason = FinishReason::EndTurn;

        while let Some(chunk) = bytes_stream.next().await {
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim().to_string();
                buffer = buffer[line_end + 1..].to_string();

                if line.is_empty() || !line.starts_with("data: ") {
                    continue;
                }
                let data = &line[6..];
                if data == "[DONE]" {
                    break;
                }

                let Ok(json) = serde_json::from_str::<Value>(data) else {
                    continue;
                };

                if let Some(choice) = json.get("choices").and_then(|c| c.as_array()).and_then(|c| c.first()) {
                    if let Some(delta) = choice.get("delta") {
                        if let Some(text) = delta.get("content").and_then(|c| c.as_str()) {
                            if !text.is_empty() {
                                content.push_str(text);
                                emit(ChatEvent::TextDelta(text.to_string()));
                            }
                        }

                        if let Some(calls) = delta.get("tool_calls").and_then(|t| t.as_array()) {
                            for call in calls {
                                let idx = call.get("index").and_then(|i| i.as_i64()).unwrap_or(0);
                                let id = call.get("id").and_then(|i| i.as_str()).unwrap_or("");
                                let Some(function) = call.get("function") else { continue };
                                let name = function.get("name").and_then(|n| n.as_str()).unwrap_or("");
                                let args = function.get("arguments").and_then(|a| a.as_str()).unwrap_or("");

                                let entry =
                                    tool_calls_map.entry(idx).or_insert_with(|| (String::new(), String::new(), String::new()));
                                if !id.is_empty() {
                                    entry.0 = id.to_string();
                                }
                                if !name.is_empty() {
                                    entry.1 = name.to_string();
                                }
                                entry.2.push_str(args);

                                if !entry.0.is_empty() && !entry.1.is_empty() && !tool_calls_started.contains(&idx) {
                                    tool_calls_started.insert(idx);
                                    emit(ChatEvent::ToolCallStart { id: entry.0.clone(), name: entry.1.clone() });
                                }
                                if !args.is_empty() && tool_calls_started.contains(&idx) {
                                    emit(ChatEvent::ToolCallArgsDelta { id: entry.0.clone(), delta: args.to_string() });
                                }
                            }
                        }
                    }

                    if let Some(reason) = choice.get("finish_reason").and_then(|f| f.as_str()) {
                        finish_reason = match reason {
                            "tool_calls" => FinishReason::ToolCalls,
                            "length" => FinishReason::MaxTokens,
                            "content_filter" => FinishReason::ContentFilter,
                            _ => FinishReason::EndTurn,
                        };
                    }
                }

                if let Some(usage_obj) = json.get("usage") {
                    usage.prompt_tokens = usage_obj.get("prompt_tokens").and_then(|t| t.as_u64()).unwrap_or(0) as u32;
                    usage.completion_tokens = usage_obj.get("completion_tokens").and_then(|t| t.as_u64()).unwrap_or(0) as u32;
                }
            }
        }

        let tool_calls: Vec<ToolCallRequest> = tool_calls_map
            .into_values()
            .filter(|(id, name, _)| !id.is_empty() && !name.is_empty())
            .map(|(id, name, args_str)| {
                let arguments = serde_json::from_str(&args_str).unwrap_or(Value::Object(Default::default()));
                ToolCallRequest { id, name, arguments }
            })
            .collect();

        if !tool_calls.is_empty() && finish_reason == FinishReason::EndTurn {
            finish_reason = FinishReason::ToolCalls;
        }

        Ok(ChatResult { content, tool_calls, finish_reason, usage })
    }
}

fn classify_http_error(status: reqwest::StatusCode, body: String) -> Error {
    match status.as_u16() {
        401 | 403 => Error::LlmAuth(format!("{status}: {body}")),
        429 => Error::LlmRateLimit(format!("{status}: {body}")),
        _ => Error::LlmError(format!("{status}: {body}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_options_enabled_for_thinking_models() {
        assert!(ConduitLlmClient::provider_options("claude-3-7-sonnet").is_some());
        assert!(ConduitLlmClient::provider_options("deepseek-chat").is_some());
        assert!(ConduitLlmClient::provider_options("gpt-4o").is_none());
    }

    #[test]
    fn classify_http_error_maps_status_codes() {
        assert!(matches!(
            classify_http_error(reqwest::StatusCode::UNAUTHORIZED, "x".into()),
            Error::LlmAuth(_)
        ));
        assert!(matches!(
            classify_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "x".into()),
            Error::LlmRateLimit(_)
        ));
        assert!(matches!(
            classify_http_error(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "x".into()),
            Error::LlmError(_)
        ));
    }

    #[test]
    fn from_env_requires_secret() {
        env::remove_var("LLM_GATEWAY_SECRET");
        assert!(ConduitLlmClient::from_env().is_err());
    }
}
