//! Application configuration options

use std::time::Duration;

use crate::dashboard::push;
use crate::storage::config::{EdgeConfig, StatusServerConfig};
use crate::storage::settings::DashSettings;
use crate::utils::CooldownOptions;
use crate::workers::{auth_renewal, device_link, poller};

/// Edge agent options
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Server origin for REST and realtime
    pub origin: String,

    /// Realtime handshake timeout
    pub handshake_timeout: Duration,

    /// Drive outputs to their off level on shutdown
    pub auto_cleanup_gpio: bool,

    /// Local status server, if enabled
    pub server: Option<ServerOptions>,

    /// Device link worker options
    pub device_link: device_link::Options,

    /// Auth renewal worker options
    pub auth_renewal: auth_renewal::Options,
}

impl AgentOptions {
    pub fn from_config(config: &EdgeConfig) -> Self {
        let settings = &config.settings;
        Self {
            lifecycle: LifecycleOptions::default(),
            origin: config.server.http_origin(),
            handshake_timeout: settings.handshake_timeout(),
            auto_cleanup_gpio: settings.auto_cleanup_gpio,
            server: settings.status_server.as_ref().map(ServerOptions::from),
            device_link: device_link::Options {
                send_interval: settings.send_interval(),
                max_reconnect_attempts: settings.max_reconnect_attempts,
                backoff: CooldownOptions::default(),
            },
            auth_renewal: auth_renewal::Options {
                late_renewal: settings.late_renewal,
            },
        }
    }
}

/// Dashboard session options
#[derive(Debug, Clone)]
pub struct DashOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Server origin for REST and realtime
    pub origin: String,

    /// Realtime handshake timeout
    pub handshake_timeout: Duration,

    /// Poller worker options
    pub poller: poller::Options,

    /// Push listener options
    pub push: push::Options,
}

impl DashOptions {
    pub fn from_settings(settings: &DashSettings) -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            origin: settings.server.http_origin(),
            handshake_timeout: Duration::from_millis(settings.socket.handshake_timeout_ms),
            poller: poller::Options {
                interval: settings.polling.interval(),
            },
            push: push::Options {
                debounce: Duration::from_millis(settings.socket.debounce_ms),
                cooldown: Duration::from_millis(settings.socket.cooldown_ms),
                health_timeout: settings.health_timeout(),
            },
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl From<&StatusServerConfig> for ServerOptions {
    fn from(config: &StatusServerConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
        }
    }
}
