//! Settings file management

use serde::{Deserialize, Serialize};

use crate::filesys::File;
use crate::logs::LogLevel;

/// Operator settings, read from `settings.json` in the storage layout.
/// Every field has a default so a missing file is not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Local public key pushed to remote authorized_keys
    #[serde(default = "default_pub_key")]
    pub pub_key_path: String,

    /// Local private key used once the cert flag is set
    #[serde(default = "default_private_key")]
    pub private_key_path: String,

    /// Substring identifying the operator key inside authorized_keys
    /// (typically the key comment, e.g. "ops@workstation")
    #[serde(default)]
    pub key_feature: String,

    /// Default remote home directory used as the script working path
    #[serde(default = "default_remote_home")]
    pub remote_home: String,

    /// docker-compose release pinned for the install action
    #[serde(default = "default_compose_version")]
    pub docker_compose_version: String,

    /// Published host port for the yacht management UI
    #[serde(default = "default_yacht_port")]
    pub yacht_port: u16,

    /// Timeout for establishing an SSH connection
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Default per-command timeout on the remote session
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

fn default_pub_key() -> String {
    "~/.ssh/id_rsa.pub".to_string()
}

fn default_private_key() -> String {
    "~/.ssh/id_rsa".to_string()
}

fn default_remote_home() -> String {
    "/root".to_string()
}

fn default_compose_version() -> String {
    "2.24.6".to_string()
}

fn default_yacht_port() -> u16 {
    8000
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_command_timeout() -> u64 {
    100
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            pub_key_path: default_pub_key(),
            private_key_path: default_private_key(),
            key_feature: String::new(),
            remote_home: default_remote_home(),
            docker_compose_version: default_compose_version(),
            yacht_port: default_yacht_port(),
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

impl Settings {
    /// Load settings from the given file. A missing file is seeded with the
    /// defaults so the operator has something to edit.
    pub async fn load(file: &File) -> Self {
        if !file.exists().await {
            let defaults = Self::default();
            if let Err(e) = file.write_json(&defaults).await {
                tracing::warn!("Unable to seed settings file: {}", e);
            }
            return defaults;
        }
        match file.read_json::<Settings>().await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Unable to read settings file, using defaults: {}", e);
                Self::default()
            }
        }
    }
}
