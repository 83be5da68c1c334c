//! Widget data binding
//!
//! A widget is bound to at most one sensor or one control of a device and
//! caches the last value it was given. Every mutation replaces the whole
//! value of one widget, keyed by widget id.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use trail_api::models::{ControlRecord, ControlStateUpdate, SensorDescriptor, SensorReading};

use crate::control::value::coerce_bool;

/// Grid columns used for default layouts
pub const GRID_COLUMNS: u32 = 4;
/// Width and height of a default widget cell
pub const CELL_SIZE: u32 = 3;

/// Widget type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidgetKind {
    Gauge,
    Value,
    Chart,
    Tank,
    Led,
    Button,
    Slider,
}

impl WidgetKind {
    /// Widgets that present their value as on/off
    pub fn is_boolean(self) -> bool {
        matches!(self, WidgetKind::Button | WidgetKind::Led)
    }

    /// Value a fresh widget starts with
    pub fn initial_value(self) -> Value {
        if self.is_boolean() {
            Value::Bool(false)
        } else {
            json!(0)
        }
    }

    /// Widget used by default for a sensor type
    pub fn for_sensor(sensor_type: &str) -> Self {
        match sensor_type.to_lowercase().as_str() {
            "temperature" | "humidity" | "pressure" => WidgetKind::Gauge,
            "boolean" | "switch" => WidgetKind::Led,
            _ => WidgetKind::Value,
        }
    }
}

/// Grid placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl GridRect {
    /// Cell `index` of the default layout
    pub fn cell(index: u32) -> Self {
        Self {
            x: (index % GRID_COLUMNS) * CELL_SIZE,
            y: (index / GRID_COLUMNS) * CELL_SIZE,
            w: CELL_SIZE,
            h: CELL_SIZE,
        }
    }
}

/// What a widget displays or drives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Binding {
    Sensor(String),
    Control(String),
    Unbound,
}

/// Dashboard widget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub id: String,
    pub kind: WidgetKind,
    pub name: String,
    pub device_id: String,
    pub binding: Binding,
    pub position: GridRect,
    /// Display options, opaque to the sync layer
    pub config: Value,
    pub value: Value,
}

impl Widget {
    pub fn control_id(&self) -> Option<&str> {
        match &self.binding {
            Binding::Control(id) => Some(id),
            _ => None,
        }
    }

    pub fn sensor_id(&self) -> Option<&str> {
        match &self.binding {
            Binding::Sensor(id) => Some(id),
            _ => None,
        }
    }

    /// Value as this widget presents it
    pub fn present(&self, value: &Value) -> Value {
        if self.kind.is_boolean() {
            Value::Bool(coerce_bool(value))
        } else {
            value.clone()
        }
    }
}

/// A single widget value change
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetChange {
    pub widget_id: String,
    pub old: Value,
    pub new: Value,
}

/// Widgets of the selected device
#[derive(Debug, Clone, Default)]
pub struct WidgetStore {
    widgets: Vec<Widget>,
}

impl WidgetStore {
    pub fn new(widgets: Vec<Widget>) -> Self {
        Self { widgets }
    }

    pub fn widgets(&self) -> &[Widget] {
        &self.widgets
    }

    pub fn get(&self, widget_id: &str) -> Option<&Widget> {
        self.widgets.iter().find(|w| w.id == widget_id)
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    pub fn replace_all(&mut self, widgets: Vec<Widget>) {
        self.widgets = widgets;
    }

    pub fn clear(&mut self) {
        self.widgets.clear();
    }

    /// Set one widget's value. Returns the change, if any.
    pub fn set_value(&mut self, widget_id: &str, value: Value) -> Option<WidgetChange> {
        let widget = self.widgets.iter_mut().find(|w| w.id == widget_id)?;
        replace(widget, value)
    }

    /// Sensor widgets take the reading of their sensor when it differs
    pub fn apply_sensor_readings(&mut self, readings: &[SensorReading]) -> Vec<WidgetChange> {
        let mut changes = Vec::new();
        for widget in self.widgets.iter_mut() {
            let Some(sensor_id) = widget.sensor_id() else {
                continue;
            };
            if let Some(reading) = readings.iter().find(|r| r.sensor_id == sensor_id) {
                changes.extend(replace(widget, reading.value.clone()));
            }
        }
        changes
    }

    /// Control widgets take the polled `current_value` when it is present
    /// and differs, coerced for boolean-presenting widgets
    pub fn apply_control_states(&mut self, states: &[ControlRecord]) -> Vec<WidgetChange> {
        let mut changes = Vec::new();
        for widget in self.widgets.iter_mut() {
            let Some(control_id) = widget.control_id() else {
                continue;
            };
            let current = states
                .iter()
                .find(|s| s.control_id == control_id)
                .and_then(|s| s.current_value.as_ref())
                .filter(|v| !v.is_null());
            if let Some(current) = current {
                let presented = widget.present(current);
                changes.extend(replace(widget, presented));
            }
        }
        changes
    }

    /// Apply a pushed control state to every widget bound to that device
    /// and control
    pub fn apply_control_update(&mut self, update: &ControlStateUpdate) -> Vec<WidgetChange> {
        let mut changes = Vec::new();
        for widget in self.widgets.iter_mut() {
            if widget.device_id == update.device_id
                && widget.control_id() == Some(update.control_id.as_str())
            {
                let presented = widget.present(&update.value);
                changes.extend(replace(widget, presented));
            }
        }
        changes
    }
}

fn replace(widget: &mut Widget, value: Value) -> Option<WidgetChange> {
    if widget.value == value {
        return None;
    }
    let old = std::mem::replace(&mut widget.value, value.clone());
    Some(WidgetChange {
        widget_id: widget.id.clone(),
        old,
        new: value,
    })
}

/// Whether a control descriptor is analog (slider) rather than digital
pub fn is_analog_control(control_id: &str, control_type: Option<&str>) -> bool {
    match control_type.map(str::to_lowercase).as_deref() {
        Some("analog") | Some("pwm") | Some("pwm_output") => true,
        Some("digital") | Some("switch") | Some("digital_output") => false,
        _ => ["fan", "pwm", "servo"].iter().any(|k| control_id.contains(k)),
    }
}

/// One widget per sensor then one per control, laid out on the default grid
pub fn default_widgets(
    device_id: &str,
    sensors: &[SensorDescriptor],
    controls: &[ControlRecord],
) -> Vec<Widget> {
    let sensor_widgets = sensors.iter().map(|sensor| {
        let sensor_type = sensor.sensor_type.as_deref().unwrap_or(&sensor.sensor_id);
        let kind = WidgetKind::for_sensor(sensor_type);
        (
            format!("sensor-{}", sensor.sensor_id),
            kind,
            sensor.name.clone().unwrap_or_else(|| sensor.sensor_id.clone()),
            Binding::Sensor(sensor.sensor_id.clone()),
            json!({
                "unit": sensor.unit.clone().unwrap_or_default(),
                "min": sensor.min_value.unwrap_or(0.0),
                "max": sensor.max_value.unwrap_or(100.0),
            }),
        )
    });

    let control_widgets = controls.iter().map(|control| {
        let analog = is_analog_control(&control.control_id, control.control_type.as_deref());
        let kind = if analog { WidgetKind::Slider } else { WidgetKind::Button };
        (
            format!("control-{}", control.control_id),
            kind,
            control.name.clone().unwrap_or_else(|| control.control_id.clone()),
            Binding::Control(control.control_id.clone()),
            json!({"min": 0, "max": if analog { 255 } else { 1 }}),
        )
    });

    sensor_widgets
        .chain(control_widgets)
        .enumerate()
        .map(|(index, (id, kind, name, binding, config))| Widget {
            id,
            kind,
            name,
            device_id: device_id.to_string(),
            binding,
            position: GridRect::cell(index as u32),
            config,
            value: kind.initial_value(),
        })
        .collect()
}
