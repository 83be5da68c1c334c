//! Sensor readings

pub mod sampler;
