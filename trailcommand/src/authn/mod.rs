//! Device identity and auth-code management

pub mod auth_code;
pub mod device_auth;
pub mod fsm;
