//! Control command execution

pub mod executor;
pub mod value;
