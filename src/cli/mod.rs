//! CLI module — command-line interface for conduit

pub mod types;

use std::sync::Arc;

use crate::config::Config;
use crate::database::Database;
use crate::device::auth::DeviceAuth;
use crate::error::Error;
use types::{AdminCommands, Cli, Commands};

/// Run the CLI application
pub async fn run(cli: Cli, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Init => {
            unreachable!("Init command is handled in main.rs before configuration is loaded");
        }

        Commands::Migrate => {
            println!("Running database migrations...");
            let database = Database::new(&config.database_url).await?;
            database.initialize().await?;
            println!("Migrations completed successfully");
        }

        Commands::Serve { host, port } => {
            println!("Starting conduit server on {}:{}", host, port);
            println!("Health check: http://{}:{}/health", host, port);
            println!("Device bridge: ws://{}:{}/bridge", host, port);
            println!();
            println!("Press Ctrl+C to stop");

            let database = Database::new(&config.database_url).await?;
            database.initialize().await?;
            crate::server::run(config, database, &host, port).await?;
        }

        Commands::Admin { action } => {
            let database = Database::new(&config.database_url).await?;
            database.initialize().await?;
            let hmac_key = config.encryption_key.clone().unwrap_or_else(|| "conduit-dev-hmac-key".to_string());
            let auth = Arc::new(DeviceAuth::new(database.pool().clone(), hmac_key.into_bytes()));
            run_admin(auth, action).await?;
        }
    }

    Ok(())
}

async fn run_admin(auth: Arc<DeviceAuth>, action: AdminCommands) -> Result<(), Error> {
    match action {
        AdminCommands::CreateToken { created_by, ttl_hours } => {
            let token = auth.create_invite_token(created_by.as_deref(), ttl_hours).await?;
            println!("Invite token (shown once): {token}");
        }
        AdminCommands::ListTokens => {
            let tokens = auth.list_tokens().await?;
            if tokens.is_empty() {
                println!("No invite tokens issued yet.");
            }
            for t in tokens {
                println!(
                    "{}  created_by={:?}  expires={}  consumed_by={:?}  revoked={}",
                    t.token_hash, t.created_by_device_id, t.expires_at, t.consumed_by_device_id, t.revoked
                );
            }
        }
        AdminCommands::RevokeToken { token_hash } => {
            auth.revoke_token(&token_hash).await?;
            println!("Token revoked: {token_hash}");
        }
        AdminCommands::ListDevices => {
            let devices = auth.list_devices().await?;
            if devices.is_empty() {
                println!("No devices registered yet.");
            }
            for d in devices {
                println!(
                    "{}  user={}  name={}  platform={}  admin={}  revoked={}  last_seen={:?}",
                    d.device_id, d.user_id, d.device_name, d.platform, d.is_admin, d.revoked, d.last_seen_at
                );
            }
        }
        AdminCommands::RevokeDevice { device_id } => {
            auth.revoke_device(&device_id).await?;
            println!("Device revoked: {device_id}");
        }
        AdminCommands::UnrevokeDevice { device_id } => {
            auth.unrevoke_device(&device_id).await?;
            println!("Device unrevoked: {device_id}");
        }
    }
    Ok(())
}
