//! TOML configuration for a chat-server process.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level process configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// This site's name, used to qualify locally-owned jids.
    pub server_name: String,
    /// Client-facing WebSocket listener.
    pub chat_server: EndpointConfig,
    /// Peer-facing WebSocket listener.
    pub exchange_server: EndpointConfig,
    /// Configured remote peers.
    #[serde(default)]
    pub remote_servers: Vec<RemoteServer>,
    /// Path to the `<username>::<hex-sha256>` credentials file.
    #[serde(default = "default_credentials_path")]
    pub credentials_file: PathBuf,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteServer {
    pub name: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("credentials.txt")
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants not expressible via serde alone.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server_name.is_empty() {
            anyhow::bail!("server_name must not be empty");
        }
        if self.chat_server.port == self.exchange_server.port && self.chat_server.host == self.exchange_server.host {
            anyhow::bail!("chat_server and exchange_server must not share a listen address");
        }
        for remote in &self.remote_servers {
            if remote.name == self.server_name {
                anyhow::bail!("remote_servers entry '{}' collides with server_name", remote.name);
            }
        }
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("invalid log level: {}", self.logging.level);
        }
        Ok(())
    }
}
