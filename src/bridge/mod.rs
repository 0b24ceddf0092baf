//! Tool Bridge (`spec.md` §4.B): the duplex, correlation-ID-multiplexed
//! transport between the server and one client. Grounded on
//! `server/yjs.rs::handle_yjs_connection`'s `tokio::select!` duplex loop
//! generalized from "broadcast a CRDT update" to "resolve a waiting future
//! by correlation id."

pub mod protocol;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::observability::BridgeRequestTimer;
use protocol::{ExecutionCommand, Frame, ReplyPayload};

/// One request kind's pending-request table. `spec.md` §3: "One table per
/// request kind (execution, memory, skill, persona, council, knowledge,
/// tool-manifest)... no correlation ID may appear in two tables."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Execution,
    Memory,
    Skill,
    Persona,
    Council,
    Knowledge,
    ToolManifest,
}

impl RequestKind {
    fn as_str(self) -> &'static str {
        match self {
            RequestKind::Execution => "execution",
            RequestKind::Memory => "memory",
            RequestKind::Skill => "skill",
            RequestKind::Persona => "persona",
            RequestKind::Council => "council",
            RequestKind::Knowledge => "knowledge",
            RequestKind::ToolManifest => "tool_manifest",
        }
    }
}

struct PendingEntry {
    kind: RequestKind,
    resolve: oneshot::Sender<ReplyPayload>,
}

/// The duplex bridge for one client session. Owns the outbound sender half
/// of the socket and the pending-request table; the inbound half (the
/// websocket handler's `select!` loop) calls [`ToolBridge::resolve`] as
/// replies arrive.
pub struct ToolBridge {
    outbound: mpsc::UnboundedSender<Frame>,
    pending: Mutex<HashMap<Uuid, PendingEntry>>,
}

impl ToolBridge {
    pub fn new(outbound: mpsc::UnboundedSender<Frame>) -> Self {
        Self {
            outbound,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// `execution(command)`: resolves with the client's tool output, or
    /// rejects with the client's error; times out at `command.timeout + 5s`
    /// (`spec.md` §4.B).
    pub async fn execution(&self, mut command: ExecutionCommand) -> Result<serde_json::Value> {
        let timeout = Duration::from_millis(command.timeout_ms) + Duration::from_secs(5);
        command.id = Uuid::new_v4();
        let frame = Frame::ExecutionRequest {
            id: command.id,
            timestamp: Utc::now(),
            payload: command,
        };
        self.request(RequestKind::Execution, frame, timeout).await
    }

    /// `memory(request, timeout=30s)` and the identically-shaped
    /// skill/persona/council/knowledge/tool-manifest requests.
    pub async fn memory(&self, payload: serde_json::Value) -> Result<serde_json::Value> {
        self.request_default_timeout(RequestKind::Memory, |id| Frame::MemoryRequest {
            id,
            timestamp: Utc::now(),
            payload,
        })
        .await
    }

    pub async fn persona(&self, payload: serde_json::Value) -> Result<serde_json::Value> {
        self.request_default_timeout(RequestKind::Persona, |id| Frame::PersonaRequest {
            id,
            timestamp: Utc::now(),
            payload,
        })
        .await
    }

    pub async fn council(&self, payload: serde_json::Value) -> Result<serde_json::Value> {
        self.request_default_timeout(RequestKind::Council, |id| Frame::CouncilRequest {
            id,
            timestamp: Utc::now(),
            payload,
        })
        .await
    }

    pub async fn knowledge(&self, payload: serde_json::Value) -> Result<serde_json::Value> {
        self.request_default_timeout(RequestKind::Knowledge, |id| Frame::KnowledgeRequest {
            id,
            timestamp: Utc::now(),
            payload,
        })
        .await
    }

    pub async fn tool_manifest(&self, payload: serde_json::Value) -> Result<serde_json::Value> {
        self.request_default_timeout(RequestKind::ToolManifest, |id| Frame::ToolRequest {
            id,
            timestamp: Utc::now(),
            payload,
        })
        .await
    }

    async fn request_default_timeout(
        &self,
        kind: RequestKind,
        build: impl FnOnce(Uuid) -> Frame,
    ) -> Result<serde_json::Value> {
        let id = Uuid::new_v4();
        self.request(kind, build(id), Duration::from_secs(30)).await
    }

    async fn request(&self, kind: RequestKind, frame: Frame, timeout: Duration) -> Result<serde_json::Value> {
        let id = frame_id(&frame);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().expect("pending table lock poisoned");
            pending.insert(id, PendingEntry { kind, resolve: tx });
        }

        let timer = BridgeRequestTimer::start(kind.as_str());
        if self.outbound.send(frame).is_err() {
            self.pending.lock().expect("pending table lock poisoned").remove(&id);
            return Err(Error::DeviceNotConnected(format!(
                "outbound channel closed for {} request {id}",
                kind.as_str()
            )));
        }

        let outcome = tokio::time::timeout(timeout, rx).await;
        timer.finish();

        match outcome {
            Ok(Ok(reply)) => {
                if reply.success {
                    Ok(reply.data.unwrap_or(serde_json::Value::Null))
                } else {
                    Err(Error::ClientError(reply.error.unwrap_or_else(|| "unknown client error".to_string())))
                }
            }
            Ok(Err(_)) => Err(Error::DeviceNotConnected(format!("session closed while awaiting {} reply", kind.as_str()))),
            Err(_) => {
                self.pending.lock().expect("pending table lock poisoned").remove(&id);
                Err(Error::Timeout(format!("{} request {id} timed out", kind.as_str())))
            }
        }
    }

    /// Fire-and-forget send: `save_to_thread`, `run_log`, `agent_lifecycle`,
    /// `task_progress`. No correlation entry is allocated.
    pub fn send_fire_and_forget(&self, frame: Frame) -> Result<()> {
        self.outbound
            .send(frame)
            .map_err(|_| Error::DeviceNotConnected("outbound channel closed".to_string()))
    }

    /// Called by the websocket handler's inbound loop when a reply frame
    /// arrives carrying `request_id`. Returns `false` if no pending entry
    /// matched (already timed out, or unknown id).
    pub fn resolve(&self, reply: ReplyPayload) -> bool {
        let entry = self.pending.lock().expect("pending table lock poisoned").remove(&reply.request_id);
        match entry {
            Some(entry) => entry.resolve.send(reply).is_ok(),
            None => false,
        }
    }

    /// `detach`'s half of the contract: reject every outstanding pending
    /// request with `device_not_connected`. Returns the number rejected.
    pub fn reject_all_pending(&self) -> usize {
        let mut pending = self.pending.lock().expect("pending table lock poisoned");
        let count = pending.len();
        for (id, entry) in pending.drain() {
            let _ = entry.resolve.send(ReplyPayload::err(id, "disconnected"));
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("pending table lock poisoned").len()
    }
}

fn frame_id(frame: &Frame) -> Uuid {
    match frame {
        Frame::RegisterDevice { id, .. }
        | Frame::DeviceRegistered { id, .. }
        | Frame::Auth { id, .. }
        | Frame::AuthFailed { id, .. }
        | Frame::ExecutionRequest { id, .. }
        | Frame::ExecutionResult { id, .. }
        | Frame::MemoryRequest { id, .. }
        | Frame::MemoryResponse { id, .. }
        | Frame::PersonaRequest { id, .. }
        | Frame::CouncilRequest { id, .. }
        | Frame::KnowledgeRequest { id, .. }
        | Frame::ToolRequest { id, .. }
        | Frame::CatalogResponse { id, .. }
        | Frame::SaveToThread { id, .. }
        | Frame::RunLog { id, .. }
        | Frame::AgentLifecycle { id, .. }
        | Frame::TaskProgress { id, .. }
        | Frame::UserNotification { id, .. }
        | Frame::CondenseRequest { id, .. }
        | Frame::CondenseResponse { id, .. }
        | Frame::ResolveLoopRequest { id, .. }
        | Frame::ResolveLoopResponse { id, .. }
        | Frame::AdminRequest { id, .. }
        | Frame::AdminResponse { id, .. }
        | Frame::Heartbeat { id, .. } => *id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bridge() -> (ToolBridge, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ToolBridge::new(tx), rx)
    }

    #[tokio::test]
    async fn execution_resolves_with_client_data() {
        let (bridge, mut rx) = make_bridge();
        let bridge = std::sync::Arc::new(bridge);
        let bridge2 = bridge.clone();

        let handle = tokio::spawn(async move {
            bridge2
                .execution(ExecutionCommand {
                    id: Uuid::nil(),
                    tool_id: "directory.create".to_string(),
                    tool_args: serde_json::json!({}),
                    timeout_ms: 1000,
                    sandboxed: false,
                    requires_approval: false,
                    dry_run: false,
                })
                .await
        });

        let sent = rx.recv().await.unwrap();
        let id = frame_id(&sent);
        bridge.resolve(ReplyPayload::ok(id, serde_json::json!({"ok": true})));

        let result = handle.await.unwrap().unwrap();
        assert_eq!(result, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn execution_times_out_when_no_reply_arrives() {
        let (bridge, _rx) = make_bridge();
        let result = bridge
            .execution(ExecutionCommand {
                id: Uuid::nil(),
                tool_id: "http.request".to_string(),
                tool_args: serde_json::json!({}),
                timeout_ms: 10,
                sandboxed: false,
                requires_approval: false,
                dry_run: false,
            })
            .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn client_error_reply_surfaces_as_client_error() {
        let (bridge, mut rx) = make_bridge();
        let bridge = std::sync::Arc::new(bridge);
        let bridge2 = bridge.clone();

        let handle = tokio::spawn(async move { bridge2.memory(serde_json::json!({"op": "index"})).await });
        let sent = rx.recv().await.unwrap();
        let id = frame_id(&sent);
        bridge.resolve(ReplyPayload::err(id, "index unavailable"));

        let result = handle.await.unwrap();
        match result {
            Err(Error::ClientError(msg)) => assert_eq!(msg, "index unavailable"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn reject_all_pending_resolves_every_outstanding_request() {
        let (bridge, mut rx) = make_bridge();
        let bridge = std::sync::Arc::new(bridge);

        let b1 = bridge.clone();
        let h1 = tokio::spawn(async move { b1.memory(serde_json::json!({})).await });
        let b2 = bridge.clone();
        let h2 = tokio::spawn(async move { b2.persona(serde_json::json!({})).await });

        let _ = rx.recv().await.unwrap();
        let _ = rx.recv().await.unwrap();

        // give both spawned tasks a chance to register in the pending table
        tokio::task::yield_now().await;
        let rejected = bridge.reject_all_pending();
        assert_eq!(rejected, 2);

        assert!(matches!(h1.await.unwrap(), Err(Error::ClientError(_))));
        assert!(matches!(h2.await.unwrap(), Err(Error::ClientError(_))));
    }
}
