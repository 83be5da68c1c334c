//! Reading control values off the wire

use serde_json::Value;

/// Read a value as a digital level
pub fn as_level(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "on" | "high" => Some(true),
            "false" | "0" | "off" | "low" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Read a value as a PWM duty, clamped to `0..=255`
pub fn as_duty(value: &Value) -> Option<u8> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Bool(b) => {
            if *b {
                255.0
            } else {
                0.0
            }
        }
        _ => return None,
    };
    if raw.is_nan() {
        return None;
    }
    Some(raw.round().clamp(0.0, 255.0) as u8)
}

/// Dashboard coercion for boolean-presenting widgets: `"true"`, `"1"`, `1`
/// and `true` are on, anything else is off
pub fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s == "true" || s == "1",
        Value::Number(n) => n.as_f64() == Some(1.0),
        _ => false,
    }
}
