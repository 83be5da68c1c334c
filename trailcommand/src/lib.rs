//! TrailCommand Library
//!
//! Device control-state and auth sync for the TrailCommand edge agent and
//! the headless dashboard session.

pub mod app;
pub mod authn;
pub mod control;
pub mod dashboard;
pub mod errors;
pub mod filesys;
pub mod hardware;
pub mod http;
pub mod logs;
pub mod realtime;
pub mod sensors;
pub mod server;
pub mod storage;
pub mod utils;
pub mod workers;
