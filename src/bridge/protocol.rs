//! Wire protocol for the device bridge (`spec.md` §6). Every frame is
//! `{type, id, timestamp, payload}`; reply frames carry
//! `{requestId, success, data?, error?}`. Grounded on `agent/protocol.rs`'s
//! tagged-enum convention (`#[serde(tag = "type", rename_all =
//! "snake_case")]`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One frame sent or received over a device's duplex socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    RegisterDevice {
        id: Uuid,
        timestamp: DateTime<Utc>,
        payload: RegisterDevicePayload,
    },
    DeviceRegistered {
        id: Uuid,
        timestamp: DateTime<Utc>,
        payload: DeviceRegisteredPayload,
    },
    Auth {
        id: Uuid,
        timestamp: DateTime<Utc>,
        payload: AuthPayload,
    },
    AuthFailed {
        id: Uuid,
        timestamp: DateTime<Utc>,
        payload: AuthFailedPayload,
    },
    ExecutionRequest {
        id: Uuid,
        timestamp: DateTime<Utc>,
        payload: ExecutionCommand,
    },
    ExecutionResult {
        id: Uuid,
        timestamp: DateTime<Utc>,
        payload: ReplyPayload,
    },
    MemoryRequest {
        id: Uuid,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
    },
    MemoryResponse {
        id: Uuid,
        timestamp: DateTime<Utc>,
        payload: ReplyPayload,
    },
    PersonaRequest {
        id: Uuid,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
    },
    CouncilRequest {
        id: Uuid,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
    },
    KnowledgeRequest {
        id: Uuid,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
    },
    ToolRequest {
        id: Uuid,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
    },
    CatalogResponse {
        id: Uuid,
        timestamp: DateTime<Utc>,
        payload: ReplyPayload,
    },
    SaveToThread {
        id: Uuid,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
    },
    RunLog {
        id: Uuid,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
    },
    AgentLifecycle {
        id: Uuid,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
    },
    TaskProgress {
        id: Uuid,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
    },
    UserNotification {
        id: Uuid,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
    },
    CondenseRequest {
        id: Uuid,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
    },
    CondenseResponse {
        id: Uuid,
        timestamp: DateTime<Utc>,
        payload: ReplyPayload,
    },
    ResolveLoopRequest {
        id: Uuid,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
    },
    ResolveLoopResponse {
        id: Uuid,
        timestamp: DateTime<Utc>,
        payload: ReplyPayload,
    },
    AdminRequest {
        id: Uuid,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
    },
    AdminResponse {
        id: Uuid,
        timestamp: DateTime<Utc>,
        payload: ReplyPayload,
    },
    Heartbeat {
        id: Uuid,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterDevicePayload {
    pub invite_token: String,
    pub user_id: String,
    pub device_id: String,
    pub device_name: String,
    pub capabilities: Vec<String>,
    pub platform: String,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRegisteredPayload {
    pub connection_key: String,
    /// Present only for the invite-token registration flow; recurring auth
    /// never returns the secret again (`spec.md` §6 authentication).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthPayload {
    pub device_id: String,
    pub device_secret: String,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthFailedPayload {
    pub reason: String,
}

/// One tool execution command sent to a client (`spec.md` §6 table row for
/// `execution_request`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionCommand {
    pub id: Uuid,
    pub tool_id: String,
    pub tool_args: serde_json::Value,
    pub timeout_ms: u64,
    #[serde(default)]
    pub sandboxed: bool,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub dry_run: bool,
}

/// The generic reply shape every request-type frame's matching response
/// carries: `{requestId, success, data?, error?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyPayload {
    pub request_id: Uuid,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReplyPayload {
    pub fn ok(request_id: Uuid, data: serde_json::Value) -> Self {
        Self {
            request_id,
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(request_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            request_id,
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_request_round_trips_through_json() {
        let frame = Frame::ExecutionRequest {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload: ExecutionCommand {
                id: Uuid::new_v4(),
                tool_id: "directory.create".to_string(),
                tool_args: serde_json::json!({"path": "/research"}),
                timeout_ms: 30_000,
                sandboxed: false,
                requires_approval: false,
                dry_run: false,
            },
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"type\":\"execution_request\""));
        let parsed: Frame = serde_json::from_str(&json).unwrap();
        match parsed {
            Frame::ExecutionRequest { payload, .. } => assert_eq!(payload.tool_id, "directory.create"),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn reply_payload_err_has_no_data() {
        let reply = ReplyPayload::err(Uuid::new_v4(), "disconnected");
        assert!(!reply.success);
        assert!(reply.data.is_none());
        assert_eq!(reply.error.as_deref(), Some("disconnected"));
    }
}
