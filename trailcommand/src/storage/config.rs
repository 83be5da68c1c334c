//! Edge client configuration file

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use serde_json::Value;
use trail_api::models::DeviceInfo;

use crate::authn::auth_code::LateRenewalPolicy;
use crate::errors::TrailError;
use crate::filesys::file::File;
use crate::logs::{LogFormat, LogLevel};
use crate::utils::generate_uuid;

/// Edge client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EdgeConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default = "default_sensors")]
    pub sensors: BTreeMap<String, SensorConfig>,

    #[serde(default = "default_controls")]
    pub controls: BTreeMap<String, ControlConfig>,

    #[serde(default)]
    pub settings: EdgeSettings,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            device: DeviceConfig::default(),
            sensors: default_sensors(),
            controls: default_controls(),
            settings: EdgeSettings::default(),
        }
    }
}

impl EdgeConfig {
    /// Load the configuration from `path`
    pub async fn load(path: &Path) -> Result<Self, TrailError> {
        let file = File::new(path);
        let mut config: EdgeConfig = file.read_json().await?;
        config.finalize();
        Ok(config)
    }

    /// Load the configuration from `path`, falling back to the built-in
    /// defaults when the file is missing or malformed. The load error, if
    /// any, is returned so it can be reported once logging is up.
    pub async fn load_or_default(path: &Path) -> (Self, Option<TrailError>) {
        match Self::load(path).await {
            Ok(config) => (config, None),
            Err(e) => {
                let mut config = Self::default();
                config.finalize();
                (config, Some(e))
            }
        }
    }

    fn finalize(&mut self) {
        if self.device.uuid.trim().is_empty() {
            self.device.uuid = generate_uuid();
        }
    }

    /// Ids of enabled sensors, in id order
    pub fn enabled_sensors(&self) -> Vec<String> {
        self.sensors
            .iter()
            .filter(|(_, s)| s.enabled)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Ids of enabled controls, in id order
    pub fn enabled_controls(&self) -> Vec<String> {
        self.controls
            .iter()
            .filter(|(_, c)| c.enabled)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Device description sent over the realtime channel
    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: self.device.name.clone(),
            device_type: self.device.device_type.clone(),
            description: self.device.description.clone(),
            uuid: self.device.uuid.clone(),
        }
    }
}

/// Backend server address
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub tls: bool,
}

fn default_host() -> String {
    "10.10.10.198".to_string()
}

fn default_port() -> u16 {
    3001
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tls: false,
        }
    }
}

impl ServerConfig {
    /// `http[s]://host:port`
    pub fn http_origin(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

/// A single login identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginIdentity {
    Email(String),
    Username(String),
}

impl std::fmt::Display for LoginIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoginIdentity::Email(v) => write!(f, "email {}", v),
            LoginIdentity::Username(v) => write!(f, "username {}", v),
        }
    }
}

/// Human principal credentials used to enroll the device
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default = "default_password")]
    pub password: SecretString,
}

fn default_password() -> SecretString {
    SecretString::from("admin123")
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: Some("admin".to_string()),
            email: Some("admin@example.com".to_string()),
            password: default_password(),
        }
    }
}

impl AuthConfig {
    /// Identities to try, email first
    pub fn identities(&self) -> Vec<LoginIdentity> {
        let email = self
            .email
            .iter()
            .filter(|v| !v.is_empty())
            .map(|v| LoginIdentity::Email(v.clone()));
        let username = self
            .username
            .iter()
            .filter(|v| !v.is_empty())
            .map(|v| LoginIdentity::Username(v.clone()));
        email.chain(username).collect()
    }
}

/// Device identity
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_device_id")]
    pub id: String,

    #[serde(default = "default_device_name")]
    pub name: String,

    #[serde(rename = "type", default = "default_device_type")]
    pub device_type: String,

    #[serde(default = "default_device_description")]
    pub description: String,

    #[serde(default)]
    pub uuid: String,
}

fn default_device_id() -> String {
    "TrailCommandProTest".to_string()
}

fn default_device_name() -> String {
    "TrailCommand Pro Device Test".to_string()
}

fn default_device_type() -> String {
    "sensor_station".to_string()
}

fn default_device_description() -> String {
    "ARM Linux IoT Device for Testing".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: default_device_id(),
            name: default_device_name(),
            device_type: default_device_type(),
            description: default_device_description(),
            uuid: String::new(),
        }
    }
}

/// How a sensor value is obtained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorSource {
    #[default]
    Simulated,
    Real,
}

/// Sensor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(rename = "type", default)]
    pub source: SensorSource,

    #[serde(default)]
    pub min_value: Option<f64>,

    #[serde(default)]
    pub max_value: Option<f64>,

    /// Pin number, or a `{trigger, echo}` pair for ranging sensors
    #[serde(default)]
    pub pin: Option<Value>,
}

impl SensorConfig {
    pub fn simulated(min_value: f64, max_value: f64) -> Self {
        Self {
            enabled: true,
            source: SensorSource::Simulated,
            min_value: Some(min_value),
            max_value: Some(max_value),
            pin: None,
        }
    }
}

fn default_sensors() -> BTreeMap<String, SensorConfig> {
    BTreeMap::from([
        ("temperature".to_string(), SensorConfig::simulated(18.0, 35.0)),
        ("humidity".to_string(), SensorConfig::simulated(30.0, 90.0)),
        ("pressure".to_string(), SensorConfig::simulated(980.0, 1020.0)),
        ("battery".to_string(), SensorConfig::simulated(75.0, 100.0)),
    ])
}

/// Control output kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    #[default]
    DigitalOutput,
    PwmOutput,
    #[serde(other)]
    Unsupported,
}

/// Control configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    pub pin: u8,

    #[serde(rename = "type", default)]
    pub kind: ControlKind,

    #[serde(default)]
    pub inverted: bool,

    /// Logical default: a boolean for digital outputs, a duty for PWM
    #[serde(default = "default_state")]
    pub default_state: Value,

    #[serde(default)]
    pub description: Option<String>,
}

fn default_state() -> Value {
    Value::Bool(false)
}

impl ControlConfig {
    pub fn digital(pin: u8, description: &str) -> Self {
        Self {
            enabled: true,
            pin,
            kind: ControlKind::DigitalOutput,
            inverted: false,
            default_state: default_state(),
            description: Some(description.to_string()),
        }
    }
}

fn default_controls() -> BTreeMap<String, ControlConfig> {
    BTreeMap::from([
        ("relay_1".to_string(), ControlConfig::digital(22, "Main relay control")),
        ("led_builtin".to_string(), ControlConfig::digital(16, "Status LED")),
    ])
}

/// Address for the local status server
#[derive(Debug, Clone, Deserialize)]
pub struct StatusServerConfig {
    #[serde(default = "default_status_host")]
    pub host: String,

    #[serde(default = "default_status_port")]
    pub port: u16,
}

fn default_status_host() -> String {
    "127.0.0.1".to_string()
}

fn default_status_port() -> u16 {
    8080
}

/// Runtime settings
#[derive(Debug, Clone, Deserialize)]
pub struct EdgeSettings {
    /// Sensor emission interval in milliseconds
    #[serde(default = "default_send_interval")]
    pub send_interval: u64,

    #[serde(default = "default_true")]
    pub auto_cleanup_gpio: bool,

    #[serde(default)]
    pub log_level: LogLevel,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Directory for a daily rolling log file
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default)]
    pub late_renewal: LateRenewalPolicy,

    #[serde(default = "default_gpio_timeout_ms")]
    pub gpio_timeout_ms: u64,

    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    #[serde(default)]
    pub status_server: Option<StatusServerConfig>,
}

fn default_true() -> bool {
    true
}

fn default_send_interval() -> u64 {
    5000
}

fn default_gpio_timeout_ms() -> u64 {
    5000
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

impl Default for EdgeSettings {
    fn default() -> Self {
        Self {
            send_interval: default_send_interval(),
            auto_cleanup_gpio: true,
            log_level: LogLevel::Info,
            log_format: LogFormat::Json,
            log_dir: None,
            late_renewal: LateRenewalPolicy::Skip,
            gpio_timeout_ms: default_gpio_timeout_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            status_server: None,
        }
    }
}

impl EdgeSettings {
    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval.max(1))
    }

    pub fn gpio_timeout(&self) -> Duration {
        Duration::from_millis(self.gpio_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}
