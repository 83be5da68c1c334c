//! Dashboard sync session

pub mod devices;
pub mod gate;
pub mod push;
pub mod session;
pub mod widgets;
