//! Device directory and picker options

use serde::Serialize;
use trail_api::models::{DeviceRecord, DeviceStatus};

use crate::realtime::events::PushEvent;

/// A device known to the dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceEntry {
    pub device_id: String,
    pub uuid: Option<String>,
    pub name: String,
    pub status: DeviceStatus,
    pub sensors: Vec<String>,
    pub controls: Vec<String>,
}

impl From<DeviceRecord> for DeviceEntry {
    fn from(record: DeviceRecord) -> Self {
        Self {
            device_id: record.device_id,
            uuid: record.uuid,
            name: record.name,
            status: record.status,
            sensors: record.sensors.into_iter().map(|s| s.sensor_id).collect(),
            controls: record.controls.into_iter().map(|c| c.control_id).collect(),
        }
    }
}

impl DeviceEntry {
    /// Text a user must type to confirm deletion: the uuid, or the name
    /// when the device has no uuid
    pub fn confirmation_text(&self) -> &str {
        match self.uuid.as_deref() {
            Some(uuid) if !uuid.is_empty() => uuid,
            _ => &self.name,
        }
    }
}

/// Whether `typed` confirms deletion of `device`
pub fn confirmation_matches(device: &DeviceEntry, typed: &str) -> bool {
    typed == device.confirmation_text()
}

/// Sensor choice offered when adding a widget
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorOption {
    pub sensor_id: String,
    pub name: String,
    pub unit: String,
}

/// Control choice offered when adding a widget
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlOption {
    pub control_id: String,
    pub name: String,
    pub analog: bool,
    pub description: String,
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Display unit for a sensor id
pub fn sensor_unit(sensor_id: &str) -> &'static str {
    match sensor_id {
        "temperature" => "°C",
        "humidity" => "%",
        "pressure" => "hPa",
        "battery" => "%",
        "light" => "lux",
        "distance" => "cm",
        _ => "",
    }
}

fn control_description(control_id: &str) -> String {
    match control_id {
        "relay_1" => "Main relay control".to_string(),
        "led_builtin" => "Status LED".to_string(),
        "fan_control" => "PWM fan speed".to_string(),
        "servo_1" => "Servo motor position".to_string(),
        other => format!("Control for {}", other),
    }
}

impl SensorOption {
    pub fn from_id(sensor_id: &str) -> Self {
        Self {
            sensor_id: sensor_id.to_string(),
            name: capitalize(sensor_id),
            unit: sensor_unit(sensor_id).to_string(),
        }
    }
}

impl ControlOption {
    pub fn from_id(control_id: &str) -> Self {
        Self {
            control_id: control_id.to_string(),
            name: capitalize(&control_id.replace('_', " ")),
            analog: super::widgets::is_analog_control(control_id, None),
            description: control_description(control_id),
        }
    }
}

/// Devices known to the dashboard plus the selection-scoped pickers
#[derive(Debug, Clone, Default)]
pub struct DeviceDirectory {
    devices: Vec<DeviceEntry>,
    selected: Option<String>,
    sensor_options: Vec<SensorOption>,
    control_options: Vec<ControlOption>,
}

impl DeviceDirectory {
    pub fn devices(&self) -> &[DeviceEntry] {
        &self.devices
    }

    pub fn get(&self, device_id: &str) -> Option<&DeviceEntry> {
        self.devices.iter().find(|d| d.device_id == device_id)
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn sensor_options(&self) -> &[SensorOption] {
        &self.sensor_options
    }

    pub fn control_options(&self) -> &[ControlOption] {
        &self.control_options
    }

    /// Insert or replace a device
    pub fn upsert(&mut self, entry: DeviceEntry) {
        let device_id = entry.device_id.clone();
        match self.devices.iter_mut().find(|d| d.device_id == device_id) {
            Some(existing) => *existing = entry,
            None => self.devices.push(entry),
        }
        if self.selected.as_deref() == Some(device_id.as_str()) {
            self.refresh_options();
        }
    }

    /// Remove a device. Clears the selection if it was selected.
    pub fn remove(&mut self, device_id: &str) -> Option<DeviceEntry> {
        let index = self.devices.iter().position(|d| d.device_id == device_id)?;
        if self.selected.as_deref() == Some(device_id) {
            self.set_selected(None);
        }
        Some(self.devices.remove(index))
    }

    pub fn set_selected(&mut self, device_id: Option<String>) {
        self.selected = device_id;
        self.refresh_options();
    }

    /// Apply a status push. Returns true when the pickers were refreshed.
    pub fn apply_push(&mut self, event: &PushEvent) -> bool {
        match event {
            PushEvent::DeviceOnline {
                device_id,
                sensors,
                controls,
            } => {
                let Some(device) = self.devices.iter_mut().find(|d| &d.device_id == device_id) else {
                    return false;
                };
                device.status = DeviceStatus::Online;
                if let Some(sensors) = sensors {
                    device.sensors = sensors.clone();
                }
                if let Some(controls) = controls {
                    device.controls = controls.clone();
                }
                if self.selected.as_deref() == Some(device_id.as_str()) {
                    self.refresh_options();
                    return true;
                }
                false
            }
            PushEvent::DeviceOffline { device_id } => {
                if let Some(device) = self.devices.iter_mut().find(|d| &d.device_id == device_id) {
                    device.status = DeviceStatus::Offline;
                }
                false
            }
            PushEvent::ControlStateUpdate(_) => false,
        }
    }

    fn refresh_options(&mut self) {
        let selected = self
            .selected
            .as_deref()
            .and_then(|id| self.devices.iter().find(|d| d.device_id == id));
        match selected {
            Some(device) => {
                self.sensor_options = device.sensors.iter().map(|s| SensorOption::from_id(s)).collect();
                self.control_options = device.controls.iter().map(|c| ControlOption::from_id(c)).collect();
            }
            None => {
                self.sensor_options.clear();
                self.control_options.clear();
            }
        }
    }
}
