//! CLI argument types and command structures

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "conduit")]
#[command(version, about = "conduit agent bridge CLI", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive setup wizard
    Init,

    /// Run database migrations
    Migrate,

    /// Start the device-bridge server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Port to bind to
        #[arg(long, default_value = "7420")]
        port: u16,
    },

    /// Admin operations on devices and invite tokens (`spec.md` §6)
    Admin {
        #[command(subcommand)]
        action: AdminCommands,
    },
}

#[derive(Subcommand)]
pub enum AdminCommands {
    /// Issue a one-time invite token a new device can register with
    CreateToken {
        /// Device id of the admin issuing the token, if known
        #[arg(long)]
        created_by: Option<String>,

        /// Time-to-live for the token, in hours
        #[arg(long, default_value = "24")]
        ttl_hours: i64,
    },

    /// List all issued invite tokens and their consumption state
    ListTokens,

    /// Revoke an unconsumed invite token by its hash (from `list-tokens`)
    RevokeToken {
        token_hash: String,
    },

    /// List all registered devices
    ListDevices,

    /// Revoke a device, rejecting its future authentication attempts
    RevokeDevice {
        device_id: String,
    },

    /// Restore a previously revoked device
    UnrevokeDevice {
        device_id: String,
    },
}
