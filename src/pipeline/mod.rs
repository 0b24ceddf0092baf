//! Pipeline (`spec.md` §4.E): intake/receptionist, planner, and step
//! executor composed sequentially into one request's full run. Grounded on
//! `jobs/mod.rs`/`jobs/executor.rs::run_job`'s dispatch-then-persist shape
//! for the overall "classify, plan, execute" sequencing.

pub mod intake;
pub mod planner;
pub mod step_executor;

use std::sync::Arc;
use std::time::Duration;

use conduit_registry::tools::ToolDefinition;

use crate::agent::executor::ToolRegistry;
use crate::agent::synthetic::LoopHooks;
use crate::agent::{DefaultEscalation, LoopConfig, NoEscalation, ToolLoop};
use crate::bridge::ToolBridge;
use crate::error::Result;
use crate::llm::LlmProvider;
use crate::recovery::AgentRegistry;

pub use intake::{IntakeResult, MessageClass, Receptionist};
pub use planner::{Plan, Planner, Step};
pub use step_executor::{PlanOutcome, StepExecutor};

/// Ties the three pipeline stages together for one user request
/// (`spec.md` §4.E). One `Pipeline` is shared across requests for a user;
/// the `Receptionist`'s FIFO gate is the only piece of cross-request shared
/// state it owns.
pub struct Pipeline {
    receptionist: Receptionist,
    planner: Planner,
    step_executor: StepExecutor,
    receptionist_loop: Arc<ToolLoop>,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bridge: Arc<ToolBridge>,
        provider: Arc<dyn LlmProvider>,
        main_registry: Arc<ToolRegistry>,
        receptionist_tools: &[ToolDefinition],
        hooks: Arc<dyn LoopHooks>,
        planning_model: impl Into<String>,
        replan_model: impl Into<String>,
        agent_registry: Arc<AgentRegistry>,
        escalation: Arc<DefaultEscalation>,
    ) -> Self {
        let mut receptionist_registry = ToolRegistry::new(bridge.clone(), Duration::from_secs(30));
        for def in receptionist_tools {
            receptionist_registry.register_bridge_tool(def.clone());
        }
        let receptionist_loop = Arc::new(ToolLoop::new(provider.clone(), Arc::new(receptionist_registry), Arc::new(NoEscalation), hooks.clone()));

        let main_loop = Arc::new(ToolLoop::new(provider.clone(), main_registry, escalation, hooks));

        let planning_model = planning_model.into();
        let replan_model = replan_model.into();

        Self {
            receptionist: Receptionist::new(bridge),
            planner: Planner::new(provider.clone(), planning_model),
            step_executor: StepExecutor::new(main_loop, provider, replan_model, agent_registry),
            receptionist_loop,
        }
    }

    /// Runs the full pipeline for one substantive (or short-path) request:
    /// intake → plan → execute steps.
    pub async fn run_request(&self, request: &str, persona_scope: Vec<String>, loop_config: LoopConfig) -> Result<PlanOutcome> {
        let intake_config = LoopConfig { max_iterations: 6, ..loop_config.clone() };
        let intake = self.receptionist.run(self.receptionist_loop.clone(), request, intake_config).await?;

        let plan = self
            .planner
            .plan(&intake.workspace, &intake.agent_id, request, &intake.intake_knowledge)
            .await?;

        self.step_executor.run(&intake.agent_id, &intake.workspace, plan, persona_scope, loop_config).await
    }
}
