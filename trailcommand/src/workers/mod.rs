//! Background workers

pub mod auth_renewal;
pub mod device_link;
pub mod poller;
