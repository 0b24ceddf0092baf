//! Persona registry - planner-selectable agent configurations.
//!
//! A persona bundles the system prompt content, the subset of tool
//! categories an agent built from it may call, a sampling temperature, and
//! a model tier. The planner picks one per agent and writes it into
//! `agent_persona.json`; everything downstream (the tool loop's tool set,
//! the LLM call's temperature/model) is scoped by that choice.

use serde::{Deserialize, Serialize};

/// Which escalation tier of model a persona starts on. The tool loop may
/// escalate a running agent past its persona's starting tier as iterations
/// accumulate (see the tool loop's model-escalation step); this field only
/// sets the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Fast,
    Workhorse,
    Architect,
}

/// Persona configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersonaConfig {
    /// Unique persona identifier (e.g., "standard", "dot").
    pub id: String,
    /// Human-readable display name.
    pub title: String,
    /// The prompt content/guidelines for this persona.
    /// Use {user_name} as placeholder for personalization.
    pub content: String,
    /// Tool categories (the leading segment of a dotted tool id) this
    /// persona's agents may call. Empty means unrestricted.
    pub tool_scope: Vec<String>,
    pub temperature: f32,
    pub model_tier: ModelTier,
    /// Whether this persona's tool loop requires a verification call after
    /// every mutating call before it is allowed to finalize (tool-loop step
    /// 9's `dotNeedsVerification` flag applies only when this is set).
    pub requires_mutation_verification: bool,
}

/// Get default persona configurations.
///
/// These are seeded to the database on first load. Users can edit them
/// or create their own custom personas.
pub fn default_personas() -> Vec<PersonaConfig> {
    vec![
        PersonaConfig {
            id: "standard".to_string(),
            title: "Standard".to_string(),
            content: r#"- Respond helpfully and accurately to {user_name}
- Match the complexity of your response to the question
- Be direct and get to the point
- No particular personality - just competent assistance"#.to_string(),
            tool_scope: Vec::new(),
            temperature: 0.7,
            model_tier: ModelTier::Fast,
            requires_mutation_verification: false,
        },
        PersonaConfig {
            id: "analyst".to_string(),
            title: "Analyst".to_string(),
            content: r#"- Break down complex topics systematically for {user_name}
- Present information in structured, organized formats
- Consider multiple angles before reaching conclusions
- Back up observations with reasoning
- Think of yourself as a thorough research analyst"#.to_string(),
            tool_scope: vec!["research".to_string(), "agent".to_string()],
            temperature: 0.4,
            model_tier: ModelTier::Workhorse,
            requires_mutation_verification: false,
        },
        PersonaConfig {
            id: "coach".to_string(),
            title: "Coach".to_string(),
            content: r#"- Help {user_name} think through problems, not just solve them
- Ask clarifying questions to understand the real goal
- Celebrate progress and acknowledge effort
- Explain the "why" behind suggestions
- Think of yourself as a supportive coach invested in {user_name}'s growth"#.to_string(),
            tool_scope: Vec::new(),
            temperature: 0.8,
            model_tier: ModelTier::Fast,
            requires_mutation_verification: false,
        },
        PersonaConfig {
            id: "dot".to_string(),
            title: "Dot".to_string(),
            content: r#"- Execute concrete edits and system changes on {user_name}'s behalf
- After every mutating action, verify it took effect before reporting success
- Prefer fewer, larger, well-verified changes over many small unverified ones
- State plainly what changed and how it was confirmed"#.to_string(),
            tool_scope: Vec::new(),
            temperature: 0.3,
            model_tier: ModelTier::Workhorse,
            requires_mutation_verification: true,
        },
    ]
}

/// Get a persona by ID from the default set.
pub fn get_persona(id: &str) -> Option<PersonaConfig> {
    default_personas().into_iter().find(|p| p.id == id)
}
