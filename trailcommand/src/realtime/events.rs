//! Typed realtime events
//!
//! Wire event names are translated here and nowhere else. Both spellings of
//! the control command event map to [`InboundEvent::ControlCommand`]; a
//! command that names its control but is otherwise unreadable becomes
//! [`InboundEvent::InvalidControlCommand`] so it can still be answered.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use trail_api::models::{
    ControlCommand, ControlStateUpdate, ControlStatus, DeviceAuthenticate, DeviceStatusEvent,
    RegisterDevice, SensorData, UserAuthenticate,
};

use crate::errors::TrailError;

/// Server to client event
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    DeviceAuthenticated(Value),
    DeviceRegistered(Value),
    DeviceRegistrationError(Value),
    DeviceAuthError(Value),
    ControlCommand(ControlCommand),
    InvalidControlCommand {
        control_id: String,
        value: Value,
        error: String,
    },
    DeviceStatus(DeviceStatusEvent),
    ControlStateUpdate(ControlStateUpdate),
    AuthSuccess(Value),
    AuthError(Value),
    Error(Value),
    Other { name: String, payload: Value },
}

impl InboundEvent {
    pub fn from_wire(name: &str, payload: Value) -> Result<Self, TrailError> {
        let event = match name {
            "device-authenticated" => InboundEvent::DeviceAuthenticated(payload),
            "device-registered" => InboundEvent::DeviceRegistered(payload),
            "device-registration-error" => InboundEvent::DeviceRegistrationError(payload),
            "device-auth-error" => InboundEvent::DeviceAuthError(payload),
            "control-command" | "control_command" => control_command(name, payload)?,
            "device_status" => InboundEvent::DeviceStatus(parse(name, payload)?),
            "control-state-update" | "control_state_update" => {
                InboundEvent::ControlStateUpdate(parse(name, payload)?)
            }
            "auth-success" => InboundEvent::AuthSuccess(payload),
            "auth-error" | "auth_error" => InboundEvent::AuthError(payload),
            "error" => InboundEvent::Error(payload),
            other => InboundEvent::Other {
                name: other.to_string(),
                payload,
            },
        };
        Ok(event)
    }
}

fn control_command(name: &str, payload: Value) -> Result<InboundEvent, TrailError> {
    let e = match serde_json::from_value::<ControlCommand>(payload.clone()) {
        Ok(command) => return Ok(InboundEvent::ControlCommand(command)),
        Err(e) => e,
    };
    match payload.get("controlId").and_then(Value::as_str) {
        Some(control_id) => Ok(InboundEvent::InvalidControlCommand {
            control_id: control_id.to_string(),
            value: payload.get("value").cloned().unwrap_or(Value::Null),
            error: format!("malformed {} payload: {}", name, e),
        }),
        None => Err(TrailError::ProtocolError(format!("malformed {} payload: {}", name, e))),
    }
}

fn parse<T: DeserializeOwned>(name: &str, payload: Value) -> Result<T, TrailError> {
    serde_json::from_value(payload)
        .map_err(|e| TrailError::ProtocolError(format!("malformed {} payload: {}", name, e)))
}

/// Client to server event
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    DeviceAuthenticate(DeviceAuthenticate),
    RegisterDevice(RegisterDevice),
    SensorData(SensorData),
    ControlStatus(ControlStatus),
    Authenticate(UserAuthenticate),
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::DeviceAuthenticate(_) => "device-authenticate",
            OutboundEvent::RegisterDevice(_) => "register-device",
            OutboundEvent::SensorData(_) => "sensor-data",
            OutboundEvent::ControlStatus(_) => "control_status",
            OutboundEvent::Authenticate(_) => "authenticate",
        }
    }

    pub fn payload(&self) -> Result<Value, TrailError> {
        fn to_value<T: Serialize>(v: &T) -> Result<Value, TrailError> {
            Ok(serde_json::to_value(v)?)
        }
        match self {
            OutboundEvent::DeviceAuthenticate(p) => to_value(p),
            OutboundEvent::RegisterDevice(p) => to_value(p),
            OutboundEvent::SensorData(p) => to_value(p),
            OutboundEvent::ControlStatus(p) => to_value(p),
            OutboundEvent::Authenticate(p) => to_value(p),
        }
    }
}

/// Dashboard-facing push notification after normalization
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    DeviceOnline {
        device_id: String,
        sensors: Option<Vec<String>>,
        controls: Option<Vec<String>>,
    },
    DeviceOffline {
        device_id: String,
    },
    ControlStateUpdate(ControlStateUpdate),
}

impl PushEvent {
    /// Normalize an inbound event. `device_status` uses `type` when present,
    /// else `status == "online"`. Events the dashboard does not consume map
    /// to `None`.
    pub fn from_inbound(event: InboundEvent) -> Option<Self> {
        match event {
            InboundEvent::DeviceStatus(status) => {
                let Some(device_id) = status.device_id else {
                    warn!("device_status without a device id, ignoring");
                    return None;
                };
                let online = match status.kind.as_deref() {
                    Some(kind) => kind == "device_online",
                    None => status.status.as_deref() == Some("online"),
                };
                if online {
                    Some(PushEvent::DeviceOnline {
                        device_id,
                        sensors: status.sensors,
                        controls: status.controls,
                    })
                } else {
                    Some(PushEvent::DeviceOffline { device_id })
                }
            }
            InboundEvent::ControlStateUpdate(update) => Some(PushEvent::ControlStateUpdate(update)),
            _ => None,
        }
    }
}
