use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "windgo", version, about = "WindGo Chat terminal client")]
pub struct Cli {
    /// Base URL of the WindGo API.
    #[arg(
        long,
        global = true,
        env = "WINDGO_BASE_URL",
        default_value = "http://localhost:8080"
    )]
    pub base_url: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the client version.
    Version,

    /// Create a local account and log in.
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "WINDGO_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Log in with email and password.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "WINDGO_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Log in through GitHub's device flow.
    DeviceLogin {
        /// Seconds to wait for the browser authorization.
        #[arg(long, default_value_t = 120)]
        timeout: u64,
    },

    /// Log in by signing a server nonce with an SSH key published on GitHub.
    SshLogin {
        /// GitHub account whose published keys include yours.
        github_user: String,
        /// Private key to sign with (default: first of ~/.ssh/id_{ed25519,ecdsa,rsa}).
        #[arg(long)]
        key: Option<PathBuf>,
        #[arg(long, default_value = "windgo-cli")]
        device_name: String,
    },

    /// Rotate the stored refresh token.
    Refresh,

    /// Deactivate this device and forget stored credentials.
    Logout,

    /// Show the account and its active devices as the server sees them.
    Me,

    /// Show the stored credentials without contacting the server.
    Whoami,

    /// List chat rooms.
    Rooms,

    /// Create a chat room.
    CreateRoom { name: String },

    /// Show messages of a room, newest first.
    Messages {
        room_id: i64,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },

    /// Send a message to a room.
    Send {
        room_id: i64,
        #[arg(required = true, num_args = 1..)]
        content: Vec<String>,
    },

    /// List other users.
    Users {
        #[arg(long)]
        search: Option<String>,
    },

    /// Revoke one of your devices.
    RevokeDevice { device_id: String },
}
