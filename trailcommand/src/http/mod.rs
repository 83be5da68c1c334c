//! REST client for the TrailCommand server

pub mod auth;
pub mod client;
pub mod devices;
pub mod sensors;
