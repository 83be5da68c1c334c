//! GPIO interface
//!
//! Pins are driven out-of-process through `raspi-gpio` (digital) and `pigs`
//! (PWM, via the pigpio daemon). When neither is usable the agent runs with
//! [`SimulatedGpio`] and never touches hardware.

use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::TrailError;

/// Pin used to probe GPIO access at startup
pub const PROBE_PIN: u8 = 25;

/// GPIO pin state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinState {
    Low,
    High,
}

impl From<bool> for PinState {
    fn from(value: bool) -> Self {
        if value {
            PinState::High
        } else {
            PinState::Low
        }
    }
}

impl From<PinState> for bool {
    fn from(state: PinState) -> Self {
        matches!(state, PinState::High)
    }
}

/// A single out-of-process GPIO operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioCommand {
    /// Put the pin in output mode
    SetOutput { pin: u8 },
    /// Drive the pin high or low
    Write { pin: u8, state: PinState },
    /// Set the PWM duty cycle (0..=255)
    Pwm { pin: u8, duty: u8 },
}

impl GpioCommand {
    pub fn pin(&self) -> u8 {
        match self {
            GpioCommand::SetOutput { pin }
            | GpioCommand::Write { pin, .. }
            | GpioCommand::Pwm { pin, .. } => *pin,
        }
    }

    fn program(&self) -> &'static str {
        match self {
            GpioCommand::Pwm { .. } => "pigs",
            _ => "raspi-gpio",
        }
    }

    fn args(&self) -> Vec<String> {
        match self {
            GpioCommand::SetOutput { pin } => {
                vec!["set".to_string(), pin.to_string(), "op".to_string()]
            }
            GpioCommand::Write { pin, state } => {
                let level = match state {
                    PinState::High => "dh",
                    PinState::Low => "dl",
                };
                vec!["set".to_string(), pin.to_string(), level.to_string()]
            }
            GpioCommand::Pwm { pin, duty } => {
                vec!["p".to_string(), pin.to_string(), duty.to_string()]
            }
        }
    }
}

impl fmt::Display for GpioCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.program(), self.args().join(" "))
    }
}

/// Whether pins are really driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GpioMode {
    Hardware,
    Simulation,
}

/// Executes GPIO commands
#[async_trait]
pub trait GpioBackend: Send + Sync {
    async fn execute(&self, command: &GpioCommand) -> Result<(), TrailError>;

    fn mode(&self) -> GpioMode;
}

/// Shells out to `raspi-gpio` / `pigs`
#[derive(Debug, Clone)]
pub struct ShellGpio {
    timeout: Duration,
}

impl ShellGpio {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl GpioBackend for ShellGpio {
    async fn execute(&self, command: &GpioCommand) -> Result<(), TrailError> {
        debug!(pin = command.pin(), command = %command, "Running GPIO command");
        run_command(command.program(), &command.args(), self.timeout)
            .await
            .map(|_| ())
            .map_err(|e| TrailError::HardwareError(format!("`{}`: {}", command, e)))
    }

    fn mode(&self) -> GpioMode {
        GpioMode::Hardware
    }
}

/// Accepts every command without touching hardware
#[derive(Debug, Clone, Default)]
pub struct SimulatedGpio;

#[async_trait]
impl GpioBackend for SimulatedGpio {
    async fn execute(&self, command: &GpioCommand) -> Result<(), TrailError> {
        debug!(pin = command.pin(), command = %command, "Simulated GPIO command");
        Ok(())
    }

    fn mode(&self) -> GpioMode {
        GpioMode::Simulation
    }
}

async fn run_command(program: &str, args: &[String], timeout: Duration) -> Result<String, String> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(timeout, child).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(e.to_string()),
        Err(_) => return Err(format!("timed out after {:?}", timeout)),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(format!("exited with {}: {}", output.status, stderr));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Detect whether GPIO is usable. Looks for `raspi-gpio` and exercises
/// [`PROBE_PIN`]; any failure selects simulation.
pub async fn probe(timeout: Duration) -> Arc<dyn GpioBackend> {
    match run_command("which", &["raspi-gpio".to_string()], timeout).await {
        Ok(path) if !path.is_empty() => {
            info!(path = %path, "raspi-gpio available, testing GPIO access...");
        }
        _ => {
            warn!("raspi-gpio not available, running in simulation mode");
            return Arc::new(SimulatedGpio);
        }
    }

    let shell = ShellGpio::new(timeout);
    let probe = [
        GpioCommand::SetOutput { pin: PROBE_PIN },
        GpioCommand::Write { pin: PROBE_PIN, state: PinState::Low },
    ];
    for command in probe.iter() {
        if let Err(e) = shell.execute(command).await {
            warn!(pin = PROBE_PIN, error = %e, "GPIO access test failed, running in simulation mode");
            return Arc::new(SimulatedGpio);
        }
    }

    info!("GPIO access test passed");
    Arc::new(shell)
}
