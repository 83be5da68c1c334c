//! Application wiring

pub mod dash;
pub mod options;
pub mod run;
pub mod state;
