//! Planner (`spec.md` §4.E.2). Produces a `Plan` from the request and the
//! intake knowledgebase, picks a persona, and writes `agent_persona.json`.
//! Grounded on `jobs/executor.rs::run_job`'s dispatch-then-persist shape,
//! generalized from "pick a job type and run it" to "pick a persona and a
//! plan, then persist both."

use std::sync::Arc;

use conduit_registry::personas::{default_personas, get_persona, PersonaConfig};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::llm::{ChatEvent, ChatRequest, LlmProvider};
use crate::workspace::persona::AgentPersonaFile;
use crate::workspace::AgentWorkspace;

/// One unit of planned work (`spec.md` §3 `Plan`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub title: String,
    pub description: String,
    pub expected_output: String,
    #[serde(default)]
    pub tool_hints: Vec<String>,
    #[serde(default)]
    pub requires_external_data: bool,
}

/// Ordered step list plus the planner's stated approach (`spec.md` §3
/// `Plan`). Created once by the planner, mutated only by
/// `AgentWorkspace::update_plan_progress` and the step executor's replan
/// call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub approach: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub is_simple_task: bool,
}

pub struct Planner {
    provider: Arc<dyn LlmProvider>,
    planning_model: String,
}

impl Planner {
    pub fn new(provider: Arc<dyn LlmProvider>, planning_model: impl Into<String>) -> Self {
        Self { provider, planning_model: planning_model.into() }
    }

    /// Produces a `Plan`, chooses a persona, and writes both
    /// `agent_persona.json` and the initial `plan.json` (`spec.md` §4.E.2).
    pub async fn plan(&self, workspace: &AgentWorkspace, agent_id: &str, request: &str, intake_knowledge: &str) -> Result<Plan> {
        let plan = self.generate_plan(request, intake_knowledge).await?;
        let persona_config = choose_persona(request);

        let persona = AgentPersonaFile::new(agent_id, &persona_config.id, persona_config.model_tier, request);
        workspace.save_persona(&persona).await?;

        let remaining: Vec<String> = plan.steps.iter().map(|s| s.id.clone()).collect();
        workspace
            .update_plan_progress(&serde_json::to_value(&plan)?, &[], &remaining, None)
            .await?;

        Ok(plan)
    }

    async fn generate_plan(&self, request: &str, intake_knowledge: &str) -> Result<Plan> {
        let messages = vec![
            serde_json::json!({
                "role": "system",
                "content": "Produce a JSON plan with fields {approach, isSimpleTask, steps:[{id,title,description,expectedOutput,toolHints,requiresExternalData}]} for the user's request. Respond with JSON only, no prose.",
            }),
            serde_json::json!({
                "role": "user",
                "content": format!("Request: {request}\n\nIntake knowledge:\n{intake_knowledge}"),
            }),
        ];

        let chat_request = ChatRequest {
            model: self.planning_model.clone(),
            messages,
            tools: Vec::new(),
            temperature: 0.2,
            max_tokens: 2048,
        };

        let mut noop = |_event: ChatEvent| {};
        let result = self.provider.chat(chat_request, &mut noop).await?;
        parse_plan(&result.content)
    }
}

/// Picks a persona by a simple keyword match over the request text, falling
/// back to `standard` (`spec.md` §4.E.2: "Chooses a persona").
fn choose_persona(request: &str) -> PersonaConfig {
    let lower = request.to_lowercase();
    let id = if ["edit", "change", "update", "delete", "rename", "move"].iter().any(|k| lower.contains(k)) {
        "dot"
    } else if ["research", "find", "compare", "analyze"].iter().any(|k| lower.contains(k)) {
        "analyst"
    } else {
        "standard"
    };
    get_persona(id).unwrap_or_else(|| default_personas().into_iter().next().expect("default personas non-empty"))
}

fn parse_plan(content: &str) -> Result<Plan> {
    let trimmed = content.trim().trim_start_matches("```json").trim_start_matches("```").trim_end_matches("```").trim();
    serde_json::from_str(trimmed).map_err(|err| Error::LlmParseFailure(format!("failed to parse plan JSON: {err}")))
}
