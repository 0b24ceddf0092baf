//! Device Registry (`spec.md` §4.A): the set of live client connections and
//! their per-connection tool bridges. Grounded on `server/yjs.rs::DocCache`'s
//! get-or-create map-of-live-sessions idiom, generalized from "one CRDT doc
//! per room" to "one bridge per connection key".

pub mod auth;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::bridge::ToolBridge;
use crate::error::{Error, Result};

/// `spec.md` §3 "Device Session": identity of one live client connection.
#[derive(Debug, Clone)]
pub struct DeviceSession {
    pub device_id: String,
    pub user_id: String,
    pub device_name: String,
    pub capabilities: Vec<String>,
    pub platform: String,
    pub connected_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl DeviceSession {
    /// At most one *agent* session (capability `memory`) per `deviceId`; a
    /// distinct *browser* session coexists under key `deviceId:browser`.
    pub fn connection_key(&self) -> String {
        if self.capabilities.iter().any(|c| c == "memory") {
            self.device_id.clone()
        } else {
            format!("{}:browser", self.device_id)
        }
    }
}

struct Connection {
    session: DeviceSession,
    bridge: Arc<ToolBridge>,
}

/// Maps connection key → live duplex session + its tool bridge. One registry
/// is shared across the whole server.
#[derive(Default)]
pub struct DeviceRegistry {
    connections: RwLock<HashMap<String, Connection>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session and returns its stable connection key. If a
    /// session already occupies that key (reconnect racing a stale close),
    /// the old bridge's pending requests are rejected before the new one
    /// takes its place.
    pub async fn attach(&self, session: DeviceSession, bridge: Arc<ToolBridge>) -> String {
        let key = session.connection_key();
        let mut connections = self.connections.write().await;
        if let Some(old) = connections.remove(&key) {
            old.bridge.reject_all_pending();
        }
        connections.insert(key.clone(), Connection { session, bridge });
        key
    }

    /// Removes the session, rejecting all outstanding pending requests with
    /// a `"disconnected"` error. Returns the number of requests rejected, or
    /// `None` if the key was already gone.
    pub async fn detach(&self, connection_key: &str) -> Option<usize> {
        let mut connections = self.connections.write().await;
        connections.remove(connection_key).map(|c| c.bridge.reject_all_pending())
    }

    pub async fn get_device_by_id(&self, connection_key: &str) -> Option<Arc<ToolBridge>> {
        self.connections.read().await.get(connection_key).map(|c| c.bridge.clone())
    }

    /// Returns the agent-capable session's bridge for a user, if connected.
    /// `spec.md` §4.A: `getDeviceForUser(userId)`.
    pub async fn get_device_for_user(&self, user_id: &str) -> Option<Arc<ToolBridge>> {
        self.connections
            .read()
            .await
            .values()
            .find(|c| c.session.user_id == user_id && c.session.capabilities.iter().any(|cap| cap == "memory"))
            .map(|c| c.bridge.clone())
    }

    /// Delivers `msg` to every live session for `user_id` (agent and browser
    /// sessions alike). Fire-and-forget per connection; a closed socket is
    /// reported back to the caller rather than silently dropped.
    pub async fn broadcast_to_user(&self, user_id: &str, frame: crate::bridge::protocol::Frame) -> Result<()> {
        let connections = self.connections.read().await;
        let mut any = false;
        let mut last_err = None;
        for conn in connections.values().filter(|c| c.session.user_id == user_id) {
            any = true;
            if let Err(e) = conn.bridge.send_fire_and_forget(frame.clone()) {
                last_err = Some(e);
            }
        }
        if !any {
            return Err(Error::DeviceNotConnected(format!("no live session for user {user_id}")));
        }
        if let Some(e) = last_err {
            return Err(e);
        }
        Ok(())
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}
