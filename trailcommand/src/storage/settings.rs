//! Dashboard session settings

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::TrailError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Dashboard session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashSettings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Backend server
    #[serde(default)]
    pub server: DashServerSettings,

    /// Poller configuration
    #[serde(default)]
    pub polling: PollingSettings,

    /// Realtime connection configuration
    #[serde(default)]
    pub socket: SocketSettings,

    /// Health check timeout in milliseconds
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,

    /// Bearer token, only ever taken from the environment
    #[serde(skip)]
    pub auth_token: Option<SecretString>,
}

fn default_health_timeout_ms() -> u64 {
    5000
}

impl Default for DashSettings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            server: DashServerSettings::default(),
            polling: PollingSettings::default(),
            socket: SocketSettings::default(),
            health_timeout_ms: default_health_timeout_ms(),
            auth_token: None,
        }
    }
}

impl DashSettings {
    /// Read the settings file. A missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self, TrailError> {
        let file = File::new(path);
        if !file.exists().await {
            return Ok(Self::default());
        }
        file.read_json().await
    }

    /// Apply `HOST`, `PORT` and `AUTH_TOKEN` overrides using `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("HOST").filter(|h| !h.is_empty()) {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!(port = %port, "Ignoring invalid PORT override"),
            }
        }
        if let Some(token) = lookup("AUTH_TOKEN").filter(|t| !t.is_empty()) {
            self.auth_token = Some(SecretString::from(token));
        }
    }

    /// Apply overrides from the process environment
    pub fn apply_process_env(&mut self) {
        self.apply_env(|key| std::env::var(key).ok());
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }
}

/// Backend server address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_true")]
    pub tls: bool,
}

fn default_host() -> String {
    "api.trailcommandpro.com".to_string()
}

fn default_port() -> u16 {
    443
}

fn default_true() -> bool {
    true
}

impl Default for DashServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tls: true,
        }
    }
}

impl DashServerSettings {
    /// `http[s]://host:port`
    pub fn http_origin(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

/// Poller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    15_000
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
        }
    }
}

impl PollingSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Realtime connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketSettings {
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

fn default_handshake_timeout_ms() -> u64 {
    20_000
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_cooldown_ms() -> u64 {
    5000
}

impl Default for SocketSettings {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: default_handshake_timeout_ms(),
            debounce_ms: default_debounce_ms(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}
