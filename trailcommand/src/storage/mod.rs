//! Persistent configuration

pub mod config;
pub mod settings;
