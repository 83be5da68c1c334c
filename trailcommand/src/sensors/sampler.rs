//! Sensor sampling

use std::collections::BTreeMap;

use rand::Rng;
use serde_json::Value;
use tracing::debug;
use trail_api::models::SensorReading;

use crate::storage::config::{SensorConfig, SensorSource};

/// Quality reported with every reading
pub const READING_QUALITY: u8 = 100;

/// Produces readings for the enabled sensors
pub struct SensorSampler {
    sensors: BTreeMap<String, SensorConfig>,
}

impl SensorSampler {
    pub fn new(sensors: BTreeMap<String, SensorConfig>) -> Self {
        Self { sensors }
    }

    /// One reading per enabled sensor, in id order
    pub fn sample(&self) -> Vec<SensorReading> {
        let mut rng = rand::thread_rng();
        self.sensors
            .iter()
            .filter(|(_, s)| s.enabled)
            .map(|(sensor_id, sensor)| {
                if sensor.source == SensorSource::Real {
                    debug!(sensor_id = %sensor_id, "Real sensor reading not implemented, using simulation");
                }
                SensorReading {
                    sensor_id: sensor_id.clone(),
                    value: simulate(&mut rng, sensor_id, sensor),
                    quality: Some(READING_QUALITY),
                }
            })
            .collect()
    }
}

/// Uniform value in `[min, max]` shaped by sensor type
pub fn simulate<R: Rng>(rng: &mut R, sensor_id: &str, sensor: &SensorConfig) -> Value {
    let min = sensor.min_value.unwrap_or(0.0);
    let max = sensor.max_value.unwrap_or(100.0);
    let (low, high) = if min <= max { (min, max) } else { (max, min) };
    let raw = if low == high { low } else { rng.gen_range(low..high) };

    match sensor_id {
        "temperature" | "humidity" | "pressure" | "distance" => Value::from(round_tenth(raw)),
        "battery" | "light" => Value::from(raw.floor() as i64),
        "motion" => Value::from(u8::from(rng.gen_bool(0.2))),
        _ => Value::from(raw),
    }
}

fn round_tenth(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
