//! The `agent_persona.json` document (`spec.md` §4.D, §4.E.2, §4.F). This is
//! the on-disk workspace counterpart of `conduit_registry::personas::
//! PersonaConfig`, plus the running agent's lifecycle status.

use conduit_registry::personas::ModelTier;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Running,
    Completed,
    Stopped,
    Interrupted,
    Failed,
    Paused,
    Blocked,
    Researching,
}

impl AgentStatus {
    /// Single source of truth for "is this task done" (`spec.md` §4.D): true
    /// only for `completed`/`stopped`. Everything else, including `paused`/
    /// `blocked`/`researching`, is non-terminal for the dead-agent scan's
    /// purposes (see the Open Question decision in `DESIGN.md`).
    pub fn is_complete(self) -> bool {
        matches!(self, AgentStatus::Completed | AgentStatus::Stopped)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPersonaFile {
    pub agent_id: String,
    pub persona_id: String,
    pub status: AgentStatus,
    pub model_tier: ModelTier,
    pub topic: String,
    #[serde(default)]
    pub restated_requests: Vec<String>,
    /// Set by the tool loop's step 9 for personas with
    /// `requires_mutation_verification`; cleared once a verification call
    /// succeeds.
    #[serde(default)]
    pub needs_mutation_verification: bool,
}

impl AgentPersonaFile {
    pub fn new(agent_id: impl Into<String>, persona_id: impl Into<String>, model_tier: ModelTier, topic: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            persona_id: persona_id.into(),
            status: AgentStatus::Running,
            model_tier,
            topic: topic.into(),
            restated_requests: Vec::new(),
            needs_mutation_verification: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_completed_and_stopped_are_complete() {
        assert!(AgentStatus::Completed.is_complete());
        assert!(AgentStatus::Stopped.is_complete());
        assert!(!AgentStatus::Running.is_complete());
        assert!(!AgentStatus::Paused.is_complete());
        assert!(!AgentStatus::Interrupted.is_complete());
    }

    #[test]
    fn persona_file_round_trips_through_json() {
        let persona = AgentPersonaFile::new("agent-1", "dot", ModelTier::Workhorse, "clean up inbox");
        let json = serde_json::to_string(&persona).unwrap();
        let back: AgentPersonaFile = serde_json::from_str(&json).unwrap();
        assert_eq!(back.agent_id, "agent-1");
        assert_eq!(back.status, AgentStatus::Running);
    }
}
