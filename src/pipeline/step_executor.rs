//! Step Executor (`spec.md` §4.E.3). Iterates a plan's steps, running one
//! tool loop per step, persisting output and progress, and replanning
//! between steps. Grounded on the overall shape of `agent/mod.rs::AgentLoop`
//! for the per-step tool-loop invocation pattern.

use std::sync::Arc;

use futures::StreamExt;

use crate::agent::{synthetic, AgentEvent, ExitReason, LoopConfig, LoopContext, ToolLoop};
use crate::error::Result;
use crate::llm::{ChatEvent, ChatRequest, LlmProvider};
use crate::recovery::AgentRegistry;
use crate::workspace::persona::AgentStatus;
use crate::workspace::AgentWorkspace;

use super::planner::Plan;

/// Outcome of running a whole plan to completion.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub success: bool,
    pub stopped: bool,
    pub infrastructure_down: bool,
    pub completed_step_ids: Vec<String>,
}

pub struct StepExecutor {
    tool_loop: Arc<ToolLoop>,
    replan_provider: Arc<dyn LlmProvider>,
    replan_model: String,
    registry: Arc<AgentRegistry>,
}

impl StepExecutor {
    pub fn new(tool_loop: Arc<ToolLoop>, replan_provider: Arc<dyn LlmProvider>, replan_model: impl Into<String>, registry: Arc<AgentRegistry>) -> Self {
        Self { tool_loop, replan_provider, replan_model: replan_model.into(), registry }
    }

    /// Runs `plan` to completion against `workspace`, registering the agent
    /// before the first `status=running` write per the recovery ordering
    /// invariant (`spec.md` §4.F).
    pub async fn run(&self, agent_id: &str, workspace: &AgentWorkspace, mut plan: Plan, persona_scope: Vec<String>, loop_config: LoopConfig) -> Result<PlanOutcome> {
        let ctx = self.registry.register(agent_id).await;
        workspace.mutate_persona(|p| p.status = AgentStatus::Running).await;

        let mut completed: Vec<String> = Vec::new();
        let mut remaining: Vec<String> = plan.steps.iter().map(|s| s.id.clone()).collect();
        let mut outcome = PlanOutcome { success: false, stopped: false, infrastructure_down: false, completed_step_ids: Vec::new() };

        let step_count = plan.steps.len();
        for index in 0..step_count {
            // Step 1: abort check.
            if ctx.is_aborted() {
                workspace.mutate_persona(|p| p.status = AgentStatus::Stopped).await;
                outcome.stopped = true;
                break;
            }

            let step = plan.steps[index].clone();
            remaining.retain(|id| id != &step.id);

            // Step 2: record current step.
            workspace
                .update_plan_progress(&serde_json::to_value(&plan)?, &completed, &remaining, None)
                .await?;

            // Step 3: briefing.
            let files = workspace.list_files().await.unwrap_or_default();
            let prior_outputs = completed.join(", ");
            let system_prompt = format!(
                "{}\n\nWorkspace files: {files:?}\nCompleted steps so far: {prior_outputs}\nCurrent step: {}\nExpected output: {}",
                crate::agent::prompt::BASE_SYSTEM_PROMPT,
                step.title,
                step.expected_output,
            );
            let messages = vec![
                serde_json::json!({ "role": "system", "content": system_prompt }),
                serde_json::json!({ "role": "user", "content": step.description }),
            ];

            // Step 4: run the tool loop with the persona-scoped tools plus `agent__escalate`.
            let mut active_tools = persona_scope.clone();
            if !active_tools.iter().any(|t| t == synthetic::ESCALATE) {
                active_tools.push(synthetic::ESCALATE.to_string());
            }

            let mut stream = self.tool_loop.clone().run(messages, active_tools, loop_config.clone(), ctx.clone());
            let mut step_output = String::new();
            let mut step_infra_down = false;
            while let Some(event) = stream.next().await {
                if let AgentEvent::Done { outcome: loop_outcome } = event {
                    step_output = loop_outcome.final_content;
                    step_infra_down = matches!(loop_outcome.exit_reason, ExitReason::InfrastructureDown { .. });
                    for call in &loop_outcome.tool_calls_made {
                        let _ = workspace
                            .append_tool_call_log(&serde_json::json!({
                                "step_id": step.id,
                                "tool": call.name,
                                "success": call.success,
                            }))
                            .await;
                    }
                }
            }

            // Step 5: persist output and progress.
            workspace.save_step_output(&step.id, &step_output).await?;
            completed.push(step.id.clone());
            outcome.completed_step_ids.push(step.id.clone());
            workspace
                .update_plan_progress(&serde_json::to_value(&plan)?, &completed, &remaining, None)
                .await?;

            if step_infra_down {
                outcome.infrastructure_down = true;
                break;
            }

            // Step 6: replan, unless this was the last step or the plan is simple.
            let is_last_step = index + 1 == step_count;
            if !plan.is_simple_task && !is_last_step {
                let drained = ctx.drain().await;
                if let Ok(delta) = self.replan(&plan, &remaining, &step_output, &files, &drained).await {
                    if let Some(delta) = delta {
                        plan.steps.truncate(index + 1);
                        plan.steps.extend(delta);
                        remaining = plan.steps[(index + 1)..].iter().map(|s| s.id.clone()).collect();
                    }
                }
                for signal in drained {
                    ctx.push_signal(signal).await;
                }
            }
        }

        if !outcome.stopped && !outcome.infrastructure_down {
            outcome.success = !outcome.completed_step_ids.is_empty();
            let final_status = if outcome.success { AgentStatus::Completed } else { AgentStatus::Failed };
            workspace.mutate_persona(|p| p.status = final_status).await;
        }

        self.registry.unregister(agent_id).await;
        Ok(outcome)
    }

    /// A short LLM call deciding whether to modify the remaining steps
    /// (`spec.md` §4.E.3 step 6). Failures are non-fatal: the caller treats
    /// `Err` the same as "no change".
    async fn replan(
        &self,
        plan: &Plan,
        remaining: &[String],
        last_step_output: &str,
        workspace_files: &[String],
        drained_signals: &[String],
    ) -> Result<Option<Vec<super::planner::Step>>> {
        let prompt = format!(
            "Given the remaining step ids {remaining:?} of plan approach '{}', the just-completed step's output:\n{last_step_output}\n\nWorkspace files: {workspace_files:?}\nUser follow-up signals: {drained_signals:?}\n\nIf the remaining steps should change, respond with JSON {{\"steps\": [...]}} in the same step shape as the plan. If no change is needed, respond with {{\"steps\": null}}.",
            plan.approach
        );
        let messages = vec![serde_json::json!({ "role": "user", "content": prompt })];
        let request = ChatRequest { model: self.replan_model.clone(), messages, tools: Vec::new(), temperature: 0.2, max_tokens: 1024 };
        let mut noop = |_event: ChatEvent| {};
        let result = self.replan_provider.chat(request, &mut noop).await?;

        #[derive(serde::Deserialize)]
        struct ReplanResponse {
            steps: Option<Vec<super::planner::Step>>,
        }
        let trimmed = result.content.trim().trim_start_matches("```json").trim_start_matches("```").trim_end_matches("```").trim();
        let parsed: ReplanResponse = serde_json::from_str(trimmed)?;
        Ok(parsed.steps)
    }
}
