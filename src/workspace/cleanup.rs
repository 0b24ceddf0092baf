//! Workspace cleanup scheduler (`spec.md` §4.D): once an agent completes,
//! its workspace is deleted 24h later. Grounded on `server/yjs.rs::
//! SaveQueue::process_loop` — interval wake, then flush entries past an age
//! threshold — generalized from a 2s debounce to a 24h retention window.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::bridge::ToolBridge;

use super::AgentWorkspace;

const SCAN_INTERVAL: Duration = Duration::from_secs(10 * 60);
const RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Tracks completed agents awaiting workspace deletion.
#[derive(Default)]
pub struct CleanupScheduler {
    completed: RwLock<HashMap<String, Instant>>,
}

impl CleanupScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks an agent complete; its workspace is deleted `RETENTION` after
    /// this call.
    pub async fn mark_complete(&self, agent_id: impl Into<String>) {
        self.completed.write().await.insert(agent_id.into(), Instant::now());
    }

    /// Background task: every `SCAN_INTERVAL`, deletes workspaces for
    /// agents past the retention window. Runs until the process exits.
    pub async fn process_loop(self: Arc<Self>, bridge: Arc<ToolBridge>) {
        loop {
            tokio::time::sleep(SCAN_INTERVAL).await;
            self.sweep_once(&bridge).await;
        }
    }

    async fn sweep_once(&self, bridge: &Arc<ToolBridge>) {
        let now = Instant::now();
        let due: Vec<String> = {
            let mut completed = self.completed.write().await;
            let due_ids: Vec<String> = completed
                .iter()
                .filter(|(_, completed_at)| now.duration_since(**completed_at) >= RETENTION)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &due_ids {
                completed.remove(id);
            }
            due_ids
        };

        for agent_id in due {
            let workspace = AgentWorkspace::new(bridge.clone(), agent_id.clone());
            if let Err(err) = workspace.cleanup().await {
                tracing::warn!(agent_id = %agent_id, error = %err, "failed to clean up agent workspace");
            }
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.completed.read().await.len()
    }
}
