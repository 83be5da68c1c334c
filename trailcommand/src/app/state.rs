//! Runtime context shared by the edge agent's workers

use std::sync::Arc;

use tracing::info;

use crate::authn::device_auth::{DeviceAuthApi, DeviceAuthenticator};
use crate::control::executor::ControlExecutor;
use crate::errors::TrailError;
use crate::hardware::gpio::{self, GpioBackend};
use crate::http::client::HttpClient;
use crate::sensors::sampler::SensorSampler;
use crate::storage::config::EdgeConfig;
use crate::workers::device_link::DeviceLink;

/// Resolved configuration plus the capabilities built from it. Built once
/// at startup and passed to whoever needs it.
pub struct RuntimeContext {
    pub config: Arc<EdgeConfig>,
    pub gpio: Arc<dyn GpioBackend>,
    pub executor: Arc<ControlExecutor>,
    pub sampler: Arc<SensorSampler>,
    pub authenticator: Arc<DeviceAuthenticator>,
}

impl RuntimeContext {
    /// Probe GPIO and build the context against the configured server
    pub async fn init(config: EdgeConfig) -> Result<Self, TrailError> {
        info!("Initializing runtime context...");
        let gpio = gpio::probe(config.settings.gpio_timeout()).await;
        let http_client = Arc::new(HttpClient::new(&config.server.http_origin())?);
        Ok(Self::with_parts(config, gpio, http_client))
    }

    /// Build the context from already-constructed capabilities
    pub fn with_parts(
        config: EdgeConfig,
        gpio: Arc<dyn GpioBackend>,
        auth_api: Arc<dyn DeviceAuthApi>,
    ) -> Self {
        let executor = Arc::new(ControlExecutor::new(config.controls.clone(), gpio.clone()));
        let sampler = Arc::new(SensorSampler::new(config.sensors.clone()));
        let authenticator = Arc::new(DeviceAuthenticator::new(
            auth_api,
            config.auth.clone(),
            config.device.clone(),
        ));

        Self {
            config: Arc::new(config),
            gpio,
            executor,
            sampler,
            authenticator,
        }
    }

    /// What the device announces over the realtime link
    pub fn device_link(&self) -> DeviceLink {
        DeviceLink {
            device_id: self.config.device.id.clone(),
            device_info: self.config.device_info(),
            sensors: self.config.enabled_sensors(),
            controls: self.config.enabled_controls(),
            executor: self.executor.clone(),
            sampler: self.sampler.clone(),
        }
    }

    /// Release hardware. Outputs go to their off level when configured to.
    pub async fn shutdown(&self) -> Result<(), TrailError> {
        info!("Shutting down runtime context...");
        if self.config.settings.auto_cleanup_gpio {
            self.executor.cleanup().await;
        }
        Ok(())
    }
}
