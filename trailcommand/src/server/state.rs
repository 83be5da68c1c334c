//! Server state

use std::sync::Arc;

use crate::control::executor::ControlExecutor;

/// Server state shared across handlers
pub struct ServerState {
    pub device_id: String,
    pub executor: Arc<ControlExecutor>,
}

impl ServerState {
    pub fn new(device_id: String, executor: Arc<ControlExecutor>) -> Self {
        Self {
            device_id,
            executor,
        }
    }
}
