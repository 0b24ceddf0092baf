//! Agent Workspace (`spec.md` §4.D): the per-agent file layout and the
//! read-modify-write operations over it, all mediated through the device
//! bridge. Grounded on `agent/executor.rs`'s command-building-then-dispatch
//! style, generalized from tool-loop calls to the fixed set of
//! `directory.*`/`file.*` tool ids every client is expected to implement
//! (confirmed by `bridge/mod.rs`'s own tests, which use `directory.create`
//! and `http.request` as representative tool ids).

pub mod cleanup;
pub mod persona;

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::bridge::protocol::ExecutionCommand;
use crate::bridge::ToolBridge;
use crate::error::Result;

pub use persona::{AgentPersonaFile, AgentStatus};

const DEFAULT_TIMEOUT_MS: u64 = 15_000;

/// Paths created for every agent, relative to the workspace root.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: String,
    pub research: String,
    pub output: String,
    pub logs: String,
}

impl WorkspacePaths {
    fn for_agent(agent_id: &str) -> Self {
        let root = format!("agents/{agent_id}");
        Self {
            research: format!("{root}/research"),
            output: format!("{root}/output"),
            logs: format!("{root}/logs"),
            root,
        }
    }
}

/// Mediates every read/write over one agent's workspace through the bridge.
pub struct AgentWorkspace {
    bridge: Arc<ToolBridge>,
    agent_id: String,
    paths: WorkspacePaths,
}

impl AgentWorkspace {
    pub fn new(bridge: Arc<ToolBridge>, agent_id: impl Into<String>) -> Self {
        let agent_id = agent_id.into();
        let paths = WorkspacePaths::for_agent(&agent_id);
        Self { bridge, agent_id, paths }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn paths(&self) -> &WorkspacePaths {
        &self.paths
    }

    async fn command(&self, tool_id: &str, args: Value) -> Result<Value> {
        self.bridge
            .execution(ExecutionCommand {
                id: Uuid::nil(),
                tool_id: tool_id.to_string(),
                tool_args: args,
                timeout_ms: DEFAULT_TIMEOUT_MS,
                sandboxed: false,
                requires_approval: false,
                dry_run: false,
            })
            .await
    }

    /// Issues four `directory.create` commands (`/`, `/research`, `/output`,
    /// `/logs`) and returns the resolved paths (`spec.md` §4.D
    /// `createWorkspace`).
    pub async fn create_workspace(&self) -> Result<WorkspacePaths> {
        for path in [&self.paths.root, &self.paths.research, &self.paths.output, &self.paths.logs] {
            self.command("directory.create", serde_json::json!({ "path": path })).await?;
        }
        Ok(self.paths.clone())
    }

    fn persona_path(&self) -> String {
        format!("{}/agent_persona.json", self.paths.root)
    }

    fn plan_path(&self) -> String {
        format!("{}/plan.json", self.paths.root)
    }

    pub async fn read_persona(&self) -> Result<AgentPersonaFile> {
        let reply = self.command("file.read", serde_json::json!({ "path": self.persona_path() })).await?;
        let text = reply.get("content").and_then(|v| v.as_str()).unwrap_or("{}");
        Ok(serde_json::from_str(text)?)
    }

    pub async fn save_persona(&self, persona: &AgentPersonaFile) -> Result<()> {
        let content = serde_json::to_string_pretty(persona)?;
        self.command("file.write", serde_json::json!({ "path": self.persona_path(), "content": content })).await?;
        Ok(())
    }

    /// Reads the raw `plan.json` document (the planner's own shape, not
    /// modeled as a Rust type since steps carry free-form `toolHints`/
    /// `expectedOutput` text the pipeline treats opaquely).
    pub async fn read_plan(&self) -> Result<Value> {
        let reply = self.command("file.read", serde_json::json!({ "path": self.plan_path() })).await?;
        let text = reply.get("content").and_then(|v| v.as_str()).unwrap_or("{}");
        Ok(serde_json::from_str(text)?)
    }

    /// Reads `agent_persona.json`, applies `f` in memory, and writes it
    /// back. Best-effort: returns `false` on a read or write failure rather
    /// than propagating the error (`spec.md` §4.D `mutatePersona`).
    pub async fn mutate_persona(&self, f: impl FnOnce(&mut AgentPersonaFile)) -> bool {
        let Ok(mut persona) = self.read_persona().await else { return false };
        f(&mut persona);
        self.save_persona(&persona).await.is_ok()
    }

    /// Writes `plan.json` with the plan body plus a `progress` block
    /// (`spec.md` §4.D `updatePlanProgress`).
    pub async fn update_plan_progress(
        &self,
        plan: &Value,
        completed: &[String],
        remaining: &[String],
        delta: Option<&Value>,
    ) -> Result<()> {
        let mut document = plan.clone();
        if let Some(obj) = document.as_object_mut() {
            obj.insert(
                "progress".to_string(),
                serde_json::json!({
                    "completedStepIds": completed,
                    "remainingStepIds": remaining,
                    "delta": delta,
                }),
            );
        }
        let content = serde_json::to_string_pretty(&document)?;
        self.command("file.write", serde_json::json!({ "path": self.plan_path(), "content": content })).await?;
        Ok(())
    }

    /// Writes a file directly under the workspace root — used for
    /// `intake_knowledge.md`, the one workspace artifact §4.D doesn't name a
    /// dedicated operation for.
    pub async fn write_file_at_root(&self, name: &str, content: &str) -> Result<()> {
        let path = format!("{}/{name}", self.paths.root);
        self.command("file.write", serde_json::json!({ "path": path, "content": content })).await?;
        Ok(())
    }

    /// Appends the step's output to `output/<step_id>.md` (`spec.md` §4.D
    /// `saveStepOutput`). Updating `plan.json`'s `completedStepIds` is the
    /// caller's job via [`Self::update_plan_progress`] — this call only
    /// persists the step's own artifact.
    pub async fn save_step_output(&self, step_id: &str, result: &str) -> Result<()> {
        let path = format!("{}/{step_id}.md", self.paths.output);
        self.command("file.write", serde_json::json!({ "path": path, "content": result })).await?;
        Ok(())
    }

    /// Appends one entry to `logs/tool-calls.jsonl` (`spec.md` §4.D
    /// `appendToolCallLog`).
    pub async fn append_tool_call_log(&self, entry: &Value) -> Result<()> {
        let path = format!("{}/tool-calls.jsonl", self.paths.logs);
        let line = format!("{entry}\n");
        self.command("file.append", serde_json::json!({ "path": path, "content": line })).await?;
        Ok(())
    }

    /// Recursive directory delete of the whole workspace root. Scheduled
    /// 24h after completion by [`cleanup::CleanupScheduler`], never called
    /// directly by the pipeline.
    pub async fn cleanup(&self) -> Result<()> {
        self.command("directory.delete", serde_json::json!({ "path": self.paths.root, "recursive": true })).await?;
        Ok(())
    }

    /// Lists every file under the workspace root, for the step executor's
    /// pre-step briefing (`spec.md` §4.E.3).
    pub async fn list_files(&self) -> Result<Vec<String>> {
        let reply = self.command("directory.list", serde_json::json!({ "path": self.paths.root, "recursive": true })).await?;
        Ok(reply
            .get("files")
            .and_then(|v| v.as_array())
            .map(|entries| entries.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default())
    }
}
