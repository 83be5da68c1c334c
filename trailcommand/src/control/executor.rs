//! Applies control commands to GPIO and keeps the control-state cache

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use trail_api::models::{ControlCommand, ControlStatus};

use crate::control::value::{as_duty, as_level};
use crate::hardware::gpio::{GpioBackend, GpioCommand, GpioMode, PinState};
use crate::storage::config::{ControlConfig, ControlKind};
use crate::utils::now_ms;

/// Owns the configured controls and their cached logical values
pub struct ControlExecutor {
    controls: BTreeMap<String, ControlConfig>,
    gpio: Arc<dyn GpioBackend>,
    states: RwLock<BTreeMap<String, Value>>,
}

impl ControlExecutor {
    pub fn new(controls: BTreeMap<String, ControlConfig>, gpio: Arc<dyn GpioBackend>) -> Self {
        Self {
            controls,
            gpio,
            states: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn mode(&self) -> GpioMode {
        self.gpio.mode()
    }

    /// Snapshot of the cached control values
    pub async fn states(&self) -> BTreeMap<String, Value> {
        self.states.read().await.clone()
    }

    /// Cached value of one control
    pub async fn state(&self, control_id: &str) -> Option<Value> {
        self.states.read().await.get(control_id).cloned()
    }

    /// Put every enabled control in output mode and drive its default level,
    /// one at a time in id order.
    pub async fn initialize(&self) {
        let simulated = self.mode() == GpioMode::Simulation;
        if simulated {
            warn!("GPIO not available, controls run in simulation mode");
        }

        for (control_id, control) in self.controls.iter().filter(|(_, c)| c.enabled) {
            let default = logical_default(control);

            if simulated {
                self.states.write().await.insert(control_id.clone(), default);
                continue;
            }

            if control.kind == ControlKind::DigitalOutput {
                let setup = GpioCommand::SetOutput { pin: control.pin };
                if let Err(e) = self.gpio.execute(&setup).await {
                    error!(control_id = %control_id, pin = control.pin, error = %e, "Failed to set up GPIO pin");
                    continue;
                }
            }

            match drive_command(control, &default) {
                Some(command) => {
                    if let Err(e) = self.gpio.execute(&command).await {
                        warn!(
                            control_id = %control_id,
                            pin = control.pin,
                            command = %command,
                            error = %e,
                            "Failed to set default state"
                        );
                    }
                }
                None => warn!(control_id = %control_id, "Unsupported control type, not driven"),
            }

            self.states.write().await.insert(control_id.clone(), default.clone());
            info!(control_id = %control_id, pin = control.pin, default_state = %default, "GPIO pin initialized");
        }
    }

    /// Execute a control command and build its acknowledgment
    pub async fn handle_command(&self, command: &ControlCommand) -> ControlStatus {
        let control_id = command.control_id.as_str();
        info!(control_id = %control_id, value = %command.value, "Received control command");

        let control = match self.controls.get(control_id).filter(|c| c.enabled) {
            Some(control) => control,
            None => {
                warn!(control_id = %control_id, "Control not found or disabled");
                return nack(command, command.value.clone(), format!("control {} not found or disabled", control_id));
            }
        };

        let logical = match control.kind {
            ControlKind::DigitalOutput => as_level(&command.value).map(Value::Bool),
            ControlKind::PwmOutput => as_duty(&command.value).map(Value::from),
            ControlKind::Unsupported => {
                return nack(command, command.value.clone(), format!("control {} has an unsupported type", control_id));
            }
        };
        let logical = match logical {
            Some(value) => value,
            None => {
                warn!(control_id = %control_id, value = %command.value, "Invalid control value");
                return nack(command, command.value.clone(), format!("invalid value {} for {}", command.value, control_id));
            }
        };

        if self.mode() == GpioMode::Simulation {
            info!(control_id = %control_id, value = %logical, "Simulated control");
            self.states.write().await.insert(control_id.to_string(), logical.clone());
            return ack(command, logical);
        }

        // guarded by the kind match above
        let Some(gpio_command) = drive_command(control, &logical) else {
            return nack(command, logical, format!("control {} cannot be driven", control_id));
        };

        let result = self.gpio.execute(&gpio_command).await;
        self.states.write().await.insert(control_id.to_string(), logical.clone());

        match result {
            Ok(()) => {
                info!(
                    control_id = %control_id,
                    pin = control.pin,
                    inverted = control.inverted,
                    command = %gpio_command,
                    "Control GPIO operation completed"
                );
                ack(command, logical)
            }
            Err(e) => {
                error!(control_id = %control_id, pin = control.pin, command = %gpio_command, error = %e, "Failed to write to GPIO pin");
                nack(command, logical, e.to_string())
            }
        }
    }

    /// Drive every initialized output to its logical off level
    pub async fn cleanup(&self) {
        if self.mode() == GpioMode::Simulation {
            info!("GPIO cleanup skipped in simulation mode");
            return;
        }

        let initialized: Vec<String> = self.states.read().await.keys().cloned().collect();
        for control_id in initialized {
            let Some(control) = self.controls.get(&control_id) else {
                continue;
            };
            let off = match control.kind {
                ControlKind::PwmOutput => Value::from(0u8),
                _ => Value::Bool(false),
            };
            let Some(command) = drive_command(control, &off) else {
                continue;
            };
            match self.gpio.execute(&command).await {
                Ok(()) => {
                    self.states.write().await.insert(control_id.clone(), off);
                    info!(control_id = %control_id, pin = control.pin, "GPIO pin cleaned up");
                }
                Err(e) => error!(control_id = %control_id, pin = control.pin, error = %e, "Error during GPIO cleanup"),
            }
        }
    }
}

fn logical_default(control: &ControlConfig) -> Value {
    match control.kind {
        ControlKind::PwmOutput => Value::from(as_duty(&control.default_state).unwrap_or(0)),
        _ => Value::Bool(as_level(&control.default_state).unwrap_or(false)),
    }
}

/// GPIO command that realizes a logical value, polarity applied
fn drive_command(control: &ControlConfig, logical: &Value) -> Option<GpioCommand> {
    match control.kind {
        ControlKind::DigitalOutput => {
            let level = as_level(logical)?;
            Some(GpioCommand::Write {
                pin: control.pin,
                state: PinState::from(level != control.inverted),
            })
        }
        ControlKind::PwmOutput => Some(GpioCommand::Pwm {
            pin: control.pin,
            duty: as_duty(logical)?,
        }),
        ControlKind::Unsupported => None,
    }
}

fn ack(command: &ControlCommand, value: Value) -> ControlStatus {
    ControlStatus {
        control_id: command.control_id.clone(),
        value,
        success: true,
        error: None,
        timestamp: now_ms(),
    }
}

fn nack(command: &ControlCommand, value: Value, error: String) -> ControlStatus {
    rejection(&command.control_id, value, error)
}

/// Negative acknowledgment for `control_id`, also used for commands whose
/// payload could not be read
pub fn rejection(control_id: &str, value: Value, error: impl Into<String>) -> ControlStatus {
    ControlStatus {
        control_id: control_id.to_string(),
        value,
        success: false,
        error: Some(error.into()),
        timestamp: now_ms(),
    }
}
