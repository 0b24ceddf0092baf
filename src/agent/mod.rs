//! Tool Loop (`spec.md` §4.C) — the heart of the system. A generic iteration
//! that drives one LLM conversation to completion through tool calls.
//!
//! Grounded on `agent/mod.rs::AgentLoop::run`'s `async_stream::stream!`
//! iteration shape; the ten-step contract, stuck detection, and synthetic
//! tools are new logic layered on top in the same idiom (state carried in a
//! small owned struct threaded through the stream, errors via the crate's
//! own `Error` enum, no panics).

pub mod executor;
pub mod prompt;
pub mod protocol;
pub mod stuck;
pub mod synthetic;

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures::Stream;
use regex::Regex;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::Error;
use crate::llm::{ChatEvent, ChatRequest, LlmProvider};

pub use executor::ToolRegistry;
pub use protocol::{AgentEvent, ExitReason, LoopOutcome, ToolCallRecord};
pub use stuck::{StuckDetector, StuckSignal};
pub use synthetic::LoopHooks;

/// Decides, per iteration, whether to swap the active model to a stronger
/// tier (`spec.md` §4.C step 2: `onModelEscalate`).
pub trait ModelEscalation: Send + Sync {
    fn escalate(&self, iteration: u32, current_model: &str) -> Option<String>;
}

/// The common policy: escalate once at a workhorse threshold and once more
/// at an architect threshold.
#[derive(Debug, Clone)]
pub struct DefaultEscalation {
    pub workhorse_at: u32,
    pub workhorse_model: String,
    pub architect_at: u32,
    pub architect_model: String,
}

impl ModelEscalation for DefaultEscalation {
    fn escalate(&self, iteration: u32, _current_model: &str) -> Option<String> {
        if iteration == self.architect_at {
            Some(self.architect_model.clone())
        } else if iteration == self.workhorse_at {
            Some(self.workhorse_model.clone())
        } else {
            None
        }
    }
}

/// Never escalates; useful for short-lived loops like the receptionist.
pub struct NoEscalation;

impl ModelEscalation for NoEscalation {
    fn escalate(&self, _iteration: u32, _current_model: &str) -> Option<String> {
        None
    }
}

/// The supervisor's injection queue and abort signal for one running loop
/// (`spec.md` §4.C inputs `ctx.injectionQueue`, `getAbortSignal()`; §4.F
/// `pushSignal`/`drainSignals`). Shared (`Arc`) between the loop and
/// whatever owns the agent's lifecycle entry.
#[derive(Default)]
pub struct LoopContext {
    injection_queue: AsyncMutex<VecDeque<String>>,
    abort: AtomicBool,
}

impl LoopContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_signal(&self, text: impl Into<String>) {
        self.injection_queue.lock().await.push_back(text.into());
    }

    pub(crate) async fn drain(&self) -> Vec<String> {
        self.injection_queue.lock().await.drain(..).collect()
    }

    pub fn abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }
}

/// Per-run configuration (`spec.md` §4.C inputs).
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub model: String,
    pub max_iterations: u32,
    pub temperature: f32,
    pub max_tokens: u32,
    pub tool_timeout: Duration,
    /// A tool call that should end the loop immediately once it succeeds.
    pub stop_tool: Option<String>,
    /// Enables the Dot-persona mutation/verification nudge.
    pub dot_verification_required: bool,
    /// One-shot nudge text for "a skill was matched but no tool has been
    /// called yet" (`spec.md` §4.C step 6); `None` disables the check.
    pub skill_first_action_nudge: Option<String>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            max_iterations: 25,
            temperature: 0.7,
            max_tokens: 4096,
            tool_timeout: Duration::from_secs(30),
            stop_tool: None,
            dot_verification_required: false,
            skill_first_action_nudge: None,
        }
    }
}

fn user_message(content: impl Into<String>) -> Value {
    serde_json::json!({ "role": "user", "content": content.into() })
}

fn assistant_text_message(content: &str) -> Value {
    serde_json::json!({ "role": "assistant", "content": content })
}

/// Strips any `reasoning` field left on assistant messages from an earlier
/// iteration; required by providers that reject stale reasoning content on
/// replay (`spec.md` §4.C steps 1 and 4).
fn sanitize_messages(messages: &mut [Value]) {
    for message in messages.iter_mut() {
        if message.get("role").and_then(|r| r.as_str()) == Some("assistant") {
            if let Some(obj) = message.as_object_mut() {
                obj.remove("reasoning");
            }
        }
    }
}

fn fake_tool_call_regex() -> Regex {
    Regex::new(r"\b([a-zA-Z][a-zA-Z0-9]*__[a-zA-Z][a-zA-Z0-9_]*)\b").expect("static regex")
}

/// Scans assistant text for `identifier__identifier` syntax that names a
/// real tool (`spec.md` §4.C step 6: fake tool-call syntax).
fn detect_fake_tool_call(re: &Regex, text: &str, known_tools: &[String]) -> Option<String> {
    re.captures_iter(text).find_map(|caps| {
        let candidate = caps.get(1)?.as_str();
        known_tools.iter().find(|name| name.as_str() == candidate).cloned()
    })
}

/// Drives one tool loop run. Stateless across runs; all run state lives in
/// the stream returned by [`ToolLoop::run`] and the shared [`LoopContext`].
pub struct ToolLoop {
    provider: Arc<dyn LlmProvider>,
    registry: Arc<ToolRegistry>,
    escalation: Arc<dyn ModelEscalation>,
    hooks: Arc<dyn LoopHooks>,
}

impl ToolLoop {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        registry: Arc<ToolRegistry>,
        escalation: Arc<dyn ModelEscalation>,
        hooks: Arc<dyn LoopHooks>,
    ) -> Self {
        Self { provider, registry, escalation, hooks }
    }

    fn tool_definitions_for(&self, active_tools: &[String]) -> Vec<Value> {
        let mut defs: Vec<Value> = self
            .registry
            .tool_definitions()
            .into_iter()
            .filter(|def| {
                def.get("function")
                    .and_then(|f| f.get("name"))
                    .and_then(|n| n.as_str())
                    .map(|name| active_tools.iter().any(|t| t == name))
                    .unwrap_or(false)
            })
            .collect();
        defs.extend(synthetic::tool_definitions());
        defs
    }

    /// Runs one full tool loop, yielding [`AgentEvent`]s as they happen and
    /// terminating with exactly one [`AgentEvent::Done`].
    pub fn run(
        self: Arc<Self>,
        initial_messages: Vec<Value>,
        initial_active_tools: Vec<String>,
        config: LoopConfig,
        ctx: Arc<LoopContext>,
    ) -> Pin<Box<dyn Stream<Item = AgentEvent> + Send>> {
        Box::pin(stream! {
            let mut messages = initial_messages;
            let mut active_tools = initial_active_tools;
            let mut iteration: u32 = 0;
            let mut model = config.model.clone();
            let mut stuck = StuckDetector::new();
            let mut dot_needs_verification = false;
            let mut skill_nudged = false;
            let mut tool_calls_made: Vec<ToolCallRecord> = Vec::new();
            let mut pending_warnings: Vec<String> = Vec::new();
            let mut last_content = String::new();
            let fake_call_re = fake_tool_call_regex();

            let exit: ExitReason = loop {
                iteration += 1;

                // Step 1: drain injection queue.
                for text in ctx.drain().await {
                    sanitize_messages(&mut messages);
                    messages.push(user_message(format!("USER UPDATE: {text}")));
                }

                // Step 2: escalate model tier.
                if let Some(new_model) = self.escalation.escalate(iteration, &model) {
                    tracing::info!(iteration, new_model = %new_model, "tool loop escalating model tier");
                    model = new_model;
                }

                // Step 3: abort check.
                if ctx.is_aborted() {
                    break ExitReason::Aborted;
                }

                // Step 4: sanitize messages.
                sanitize_messages(&mut messages);

                tracing::debug!(iteration, tool_count = active_tools.len(), %model, "tool loop iteration");

                // Step 5: call the LLM.
                let request = ChatRequest {
                    model: model.clone(),
                    messages: messages.clone(),
                    tools: self.tool_definitions_for(&active_tools),
                    temperature: config.temperature,
                    max_tokens: config.max_tokens,
                };

                let mut pending_events: Vec<AgentEvent> = Vec::new();
                let chat_result = {
                    let mut emit = |event: ChatEvent| match event {
                        ChatEvent::TextDelta(content) => pending_events.push(AgentEvent::TextDelta { content }),
                        ChatEvent::ToolCallStart { id, name } => pending_events.push(AgentEvent::ToolCallStart { id, name }),
                        ChatEvent::ToolCallArgsDelta { .. } => {}
                    };
                    self.provider.chat(request, &mut emit).await
                };
                for event in pending_events {
                    yield event;
                }

                let result = match chat_result {
                    Ok(r) => r,
                    Err(Error::InfrastructureDown(message)) => break ExitReason::InfrastructureDown { message },
                    Err(err) => break ExitReason::LlmError { message: err.to_string() },
                };
                last_content = result.content.clone();

                // Step 6: no tool calls.
                if result.tool_calls.is_empty() {
                    if let Some(name) = detect_fake_tool_call(&fake_call_re, &result.content, &active_tools) {
                        messages.push(assistant_text_message(&result.content));
                        messages.push(user_message(format!(
                            "It looks like you tried to call `{name}` as plain text. Call it through the function-calling interface instead."
                        )));
                        continue;
                    }

                    if config.dot_verification_required && dot_needs_verification {
                        messages.push(assistant_text_message(&result.content));
                        messages.push(user_message(
                            "Verify the change you just made with a read-only tool before finishing.",
                        ));
                        continue;
                    }

                    if let Some(nudge) = config.skill_first_action_nudge.clone() {
                        if !skill_nudged && tool_calls_made.is_empty() {
                            skill_nudged = true;
                            messages.push(assistant_text_message(&result.content));
                            messages.push(user_message(nudge));
                            continue;
                        }
                    }

                    break ExitReason::NoToolCalls;
                }

                messages.push(executor::assistant_tool_message(&result.content, &result.tool_calls));

                // Step 7: execute tool calls in order.
                let mut infra_down: Option<String> = None;
                let mut stopped_by_tool: Option<Value> = None;
                let mut escalated_reason: Option<String> = None;
                let mut force_escalate = false;
                let mut short_circuit = false;

                for call in &result.tool_calls {
                    if short_circuit {
                        let placeholder = serde_json::json!({ "error": "Skipped — batch interrupted" });
                        messages.push(serde_json::json!({
                            "role": "tool",
                            "tool_call_id": call.id,
                            "content": placeholder.to_string(),
                        }));
                        continue;
                    }

                    yield AgentEvent::ToolCallStart { id: call.id.clone(), name: call.name.clone() };

                    if synthetic::is_synthetic(&call.name) {
                        let (result_value, effect) = synthetic::handle(call, self.hooks.as_ref()).await;
                        for id in &effect.newly_added_tools {
                            if !active_tools.contains(id) {
                                active_tools.push(id.clone());
                            }
                        }
                        if effect.escalated {
                            escalated_reason = effect.escalation_reason.clone();
                        }
                        if let Some(text) = effect.inject_user_message.clone() {
                            messages.push(user_message(text));
                        }
                        let success = result_value.get("error").is_none();
                        tool_calls_made.push(ToolCallRecord {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                            result: result_value.clone(),
                            success,
                        });
                        messages.push(serde_json::json!({
                            "role": "tool",
                            "tool_call_id": call.id,
                            "content": result_value.to_string(),
                        }));
                        yield AgentEvent::ToolCallResult {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            success,
                            result: result_value,
                        };
                        if effect.break_batch {
                            short_circuit = true;
                        }
                        continue;
                    }

                    let outcome = self.registry.execute_one(call, config.tool_timeout).await;
                    tool_calls_made.push(ToolCallRecord {
                        id: outcome.id.clone(),
                        name: outcome.name.clone(),
                        arguments: call.arguments.clone(),
                        result: outcome.result.clone(),
                        success: outcome.success,
                    });
                    messages.push(executor::tool_result_message(&outcome));
                    yield AgentEvent::ToolCallResult {
                        id: outcome.id.clone(),
                        name: outcome.name.clone(),
                        success: outcome.success,
                        result: outcome.result.clone(),
                    };

                    if config.stop_tool.as_deref() == Some(call.name.as_str()) && outcome.success {
                        stopped_by_tool = Some(call.arguments.clone());
                    }

                    if outcome.infrastructure_down {
                        let message = outcome
                            .result
                            .get("error")
                            .and_then(|v| v.as_str())
                            .unwrap_or("infrastructure down")
                            .to_string();
                        infra_down = Some(message);
                        short_circuit = true;
                    }
                    if outcome.break_batch {
                        short_circuit = true;
                    }

                    // Step 8: stuck detection.
                    match stuck.record(call, outcome.success) {
                        StuckSignal::Warn => {
                            pending_warnings
                                .push(format!("Warning: repeated or failing calls to `{}` detected.", call.name));
                        }
                        StuckSignal::ForceEscalate => force_escalate = true,
                        StuckSignal::None => {}
                    }

                    // Step 9: Dot mutation/verification flag.
                    if config.dot_verification_required {
                        if outcome.success && self.registry.is_mutating(&call.name) {
                            dot_needs_verification = true;
                        } else if self.registry.is_verification(&call.name) {
                            dot_needs_verification = false;
                        }
                    }
                }

                if let Some(message) = infra_down {
                    break ExitReason::InfrastructureDown { message };
                }
                if force_escalate {
                    yield AgentEvent::Stuck { message: "repeated stuck warnings; forcing escalation".to_string() };
                    break ExitReason::Escalated { reason: "repeated stuck warnings".to_string() };
                }
                if let Some(reason) = escalated_reason {
                    break ExitReason::Escalated { reason };
                }
                if let Some(stop_tool_args) = stopped_by_tool {
                    break ExitReason::StoppedByTool { stop_tool_args };
                }

                // Step 10: inject pending warnings and loop.
                for warning in pending_warnings.drain(..) {
                    messages.push(user_message(warning));
                }

                if iteration >= config.max_iterations {
                    sanitize_messages(&mut messages);
                    messages.push(user_message(
                        "You have reached the maximum number of steps. Summarize the work you accomplished; this is your final response.",
                    ));
                    let synthesis_request = ChatRequest {
                        model: model.clone(),
                        messages: messages.clone(),
                        tools: Vec::new(),
                        temperature: config.temperature,
                        max_tokens: config.max_tokens,
                    };
                    let mut synthesis_events: Vec<AgentEvent> = Vec::new();
                    let synthesis_result = {
                        let mut emit = |event: ChatEvent| {
                            if let ChatEvent::TextDelta(content) = event {
                                synthesis_events.push(AgentEvent::TextDelta { content });
                            }
                        };
                        self.provider.chat(synthesis_request, &mut emit).await
                    };
                    for event in synthesis_events {
                        yield event;
                    }
                    if let Ok(r) = synthesis_result {
                        last_content = r.content;
                    }
                    break ExitReason::MaxIterationsSynthesized;
                }
            };

            yield AgentEvent::Done {
                outcome: LoopOutcome {
                    exit_reason: exit,
                    final_content: last_content,
                    tool_calls_made,
                    iterations: iteration,
                },
            };
        })
    }
}
