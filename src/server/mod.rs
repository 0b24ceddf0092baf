//! Device-bridge server (`spec.md` §6): HTTP health check plus the
//! websocket upgrade every client connects through.

pub mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};

use crate::config::Config;
use crate::database::Database;
use crate::device::auth::DeviceAuth;
use crate::device::DeviceRegistry;
use crate::error::Result;
use crate::recovery::AgentRegistry;

/// Shared state for every websocket connection and admin HTTP route.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub devices: Arc<DeviceRegistry>,
    pub device_auth: Arc<DeviceAuth>,
    pub agents: Arc<AgentRegistry>,
}

/// Start the device-bridge server: binds `host:port`, serves `/health` and
/// the `/bridge` websocket upgrade.
pub async fn run(config: Config, database: Database, host: &str, port: u16) -> Result<()> {
    let hmac_key = config.encryption_key.clone().unwrap_or_else(|| "conduit-dev-hmac-key".to_string());
    let device_auth = Arc::new(DeviceAuth::new(database.pool().clone(), hmac_key.into_bytes()));
    let devices = Arc::new(DeviceRegistry::new());
    let agents = Arc::new(AgentRegistry::new());

    let state = AppState {
        config: Arc::new(config),
        devices,
        device_auth,
        agents,
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/bridge", get(ws::device_bridge_handler))
        .with_state(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("conduit server listening on {}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>()).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
