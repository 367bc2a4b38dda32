use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::media::DEFAULT_MAX_IMAGE_BYTES;

/// Command-line flags. Only values the user actually passed are serialized,
/// so unset flags never shadow the TOML file or the environment.
#[derive(Parser, Serialize, Clone, Debug, Default)]
#[command(name = "campus-chat-server", version, about = "Campus chat messaging server")]
pub struct Cli {
    /// Port to listen on [default: 3000]
    #[arg(long, env = "CAMPUS_CHAT_PORT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long, env = "CAMPUS_CHAT_BIND_ADDRESS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, default_value = "./campus-chat.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "CAMPUS_CHAT_JSON_LOGS")]
    #[serde(skip_serializing_if = "is_false")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip_serializing_if = "is_false")]
    pub generate_config: bool,

    /// Register (or update) a user, print an access token for it and exit
    #[arg(long, value_name = "USER_ID")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provision_user: Option<String>,

    /// Display name used with --provision-user (defaults to the user id)
    #[arg(long, requires = "provision_user")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Data directory for persistent state (DB, keys, media) [default: ./data]
    #[arg(long, env = "CAMPUS_CHAT_DATA_DIR")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// Upper bound on a single history read or write, in milliseconds [default: 5000]
    #[arg(long, env = "CAMPUS_CHAT_HISTORY_TIMEOUT_MS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_timeout_ms: Option<u64>,

    /// Maximum HTTP request body size in bytes [default: 5242880]
    #[arg(long, env = "CAMPUS_CHAT_MAX_BODY_BYTES")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_body_bytes: Option<usize>,

    /// Interval between server pings on a live connection, in milliseconds [default: 30000]
    #[arg(long, env = "CAMPUS_CHAT_PING_INTERVAL_MS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping_interval_ms: Option<u64>,

    /// How long to wait for a pong before closing the connection, in milliseconds [default: 10000]
    #[arg(long, env = "CAMPUS_CHAT_PONG_TIMEOUT_MS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pong_timeout_ms: Option<u64>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Resolved server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub config: String,
    pub json_logs: bool,
    pub generate_config: bool,
    pub provision_user: Option<String>,
    pub display_name: Option<String>,
    pub data_dir: String,
    pub history_timeout_ms: u64,
    pub max_body_bytes: usize,
    pub ping_interval_ms: u64,
    pub pong_timeout_ms: u64,

    /// Media store configuration (loaded from [media] section in TOML)
    #[serde(default)]
    pub media: Option<MediaConfig>,
}

/// Configuration for image attachments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Maximum decoded image size in bytes (default: 2 MiB)
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,

    /// URL path the media directory is served under (default: "/media")
    #[serde(default = "default_public_path")]
    pub public_path: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            public_path: default_public_path(),
        }
    }
}

fn default_max_image_bytes() -> usize {
    DEFAULT_MAX_IMAGE_BYTES
}

fn default_public_path() -> String {
    "/media".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            bind_address: "0.0.0.0".to_string(),
            config: "./campus-chat.toml".to_string(),
            json_logs: false,
            generate_config: false,
            provision_user: None,
            display_name: None,
            data_dir: "./data".to_string(),
            history_timeout_ms: 5000,
            max_body_bytes: 5 * 1024 * 1024,
            ping_interval_ms: 30_000,
            pong_timeout_ms: 10_000,
            media: Some(MediaConfig::default()),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (CAMPUS_CHAT_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        Self::from_cli(Cli::parse())
    }

    /// Resolve the full layer stack on top of already parsed flags.
    pub fn from_cli(cli: Cli) -> Result<Self, figment::Error> {
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("CAMPUS_CHAT_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }

    pub fn history_timeout(&self) -> Duration {
        Duration::from_millis(self.history_timeout_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        // tokio's interval rejects a zero period
        Duration::from_millis(self.ping_interval_ms.max(1))
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }

    pub fn media(&self) -> MediaConfig {
        self.media.clone().unwrap_or_default()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Campus Chat Server Configuration
# Place this file at ./campus-chat.toml or specify with --config <path>
# All settings can be overridden via environment variables (CAMPUS_CHAT_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 3000)
# port = 3000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database, JWT signing key and media files
# data_dir = "./data"

# Upper bound on a single history read or write, in milliseconds
# history_timeout_ms = 5000

# Maximum HTTP request body size in bytes (image data URLs count here)
# max_body_bytes = 5242880

# Live connections are pinged on this interval and closed when no pong
# arrives within the timeout (milliseconds)
# ping_interval_ms = 30000
# pong_timeout_ms = 10000

# ---- Image Attachments ----
# [media]

# Maximum decoded image size in bytes (default: 2 MiB)
# max_image_bytes = 2097152

# URL path the media directory is served under
# public_path = "/media"
"#
    .to_string()
}
