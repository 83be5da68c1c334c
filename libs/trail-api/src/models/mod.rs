//! API models

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ================================= REST ===================================== //

/// Login request. Exactly one of `email` / `username` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub password: String,
}

/// Login response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub user: Value,
}

/// Device creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDeviceRequest {
    pub device_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub description: String,
    pub uuid: String,
}

/// Auth code response. Both fields are optional on the wire so that a
/// missing field can be reported precisely. `expires` is either an ISO-8601
/// string or epoch milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthCodeResponse {
    #[serde(rename = "authCode", default)]
    pub auth_code: Option<String>,
    #[serde(default)]
    pub expires: Option<Value>,
}

/// Device connectivity status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Sensor descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDescriptor {
    pub sensor_id: String,
    #[serde(rename = "type", default)]
    pub sensor_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub min_value: Option<f64>,
    #[serde(default)]
    pub max_value: Option<f64>,
}

/// Control descriptor with its current state, as returned by `GET /devices/:id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlRecord {
    pub control_id: String,
    #[serde(rename = "type", default)]
    pub control_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub inverted: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub current_value: Option<Value>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Device record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: String,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: DeviceStatus,
    #[serde(default)]
    pub sensors: Vec<SensorDescriptor>,
    #[serde(default)]
    pub controls: Vec<ControlRecord>,
    #[serde(default)]
    pub auth_enabled: bool,
}

/// `GET /devices/:id` response. Older servers put the control list at the
/// top level, newer ones nest the whole record under `device`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceDetailsResponse {
    #[serde(default)]
    pub device: Option<DeviceRecord>,
    #[serde(default)]
    pub controls: Vec<ControlRecord>,
}

impl DeviceDetailsResponse {
    /// Control states, wherever the server put them
    pub fn control_states(&self) -> &[ControlRecord] {
        if !self.controls.is_empty() {
            return &self.controls;
        }
        self.device
            .as_ref()
            .map(|d| d.controls.as_slice())
            .unwrap_or(&[])
    }
}

/// A single sensor reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub sensor_id: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
}

/// `GET /sensors/:deviceId` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatestSensorsResponse {
    #[serde(default)]
    pub sensors: Vec<SensorReading>,
}

/// `POST /devices/:id/control` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlCommandRequest {
    #[serde(rename = "controlId")]
    pub control_id: String,
    pub value: Value,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

// =============================== REALTIME =================================== //

/// Device description sent during realtime authentication and registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub description: String,
    pub uuid: String,
}

/// `device-authenticate` payload. `auth_code` is `null` in degraded mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceAuthenticate {
    pub auth_code: Option<String>,
    pub device_info: DeviceInfo,
}

/// `register-device` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterDevice {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    #[serde(rename = "deviceInfo")]
    pub device_info: DeviceInfo,
    pub sensors: Vec<String>,
    pub controls: Vec<String>,
}

/// `sensor-data` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorData {
    pub readings: Vec<SensorReading>,
}

/// Control command delivered to a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlCommand {
    #[serde(rename = "controlId")]
    pub control_id: String,
    pub value: Value,
}

/// `control_status` acknowledgment sent by a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlStatus {
    #[serde(rename = "controlId")]
    pub control_id: String,
    pub value: Value,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unix epoch milliseconds
    pub timestamp: i64,
}

/// `authenticate` payload sent by a dashboard session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAuthenticate {
    pub token: String,
}

/// `device_status` payload. Two wire formats exist: `{type: "device_online"}`
/// and the older `{status: "online"}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatusEvent {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "deviceId", alias = "device_id", default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub sensors: Option<Vec<String>>,
    #[serde(default)]
    pub controls: Option<Vec<String>>,
}

/// `control-state-update` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlStateUpdate {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    #[serde(rename = "controlId")]
    pub control_id: String,
    pub value: Value,
}
