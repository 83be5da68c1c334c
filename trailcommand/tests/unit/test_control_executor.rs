//! Control executor tests

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};
use trail_api::models::ControlCommand;

use trailcommand::control::executor::ControlExecutor;
use trailcommand::hardware::gpio::{GpioCommand, PinState};
use trailcommand::storage::config::{ControlConfig, ControlKind};

use crate::support::RecordingGpio;

fn controls() -> BTreeMap<String, ControlConfig> {
    let mut inverted = ControlConfig::digital(16, "Status LED");
    inverted.inverted = true;
    let pwm = ControlConfig {
        kind: ControlKind::PwmOutput,
        default_state: json!(0),
        ..ControlConfig::digital(18, "PWM fan speed")
    };
    let mut disabled = ControlConfig::digital(5, "Spare");
    disabled.enabled = false;

    BTreeMap::from([
        ("relay_1".to_string(), ControlConfig::digital(22, "Main relay control")),
        ("led_builtin".to_string(), inverted),
        ("fan_pwm".to_string(), pwm),
        ("spare".to_string(), disabled),
    ])
}

fn command(control_id: &str, value: Value) -> ControlCommand {
    ControlCommand {
        control_id: control_id.to_string(),
        value,
    }
}

#[tokio::test]
async fn test_end_to_end_relay_command() {
    let gpio = Arc::new(RecordingGpio::hardware());
    let executor = ControlExecutor::new(controls(), gpio.clone());

    executor.initialize().await;
    let init = gpio.commands();
    assert!(init.contains(&GpioCommand::SetOutput { pin: 22 }));
    assert!(init.contains(&GpioCommand::Write { pin: 22, state: PinState::Low }));
    assert_eq!(executor.state("relay_1").await, Some(json!(false)));
    gpio.clear();

    let status = executor.handle_command(&command("relay_1", json!(true))).await;

    assert_eq!(gpio.commands(), vec![GpioCommand::Write { pin: 22, state: PinState::High }]);
    assert_eq!(executor.state("relay_1").await, Some(json!(true)));
    assert_eq!(status.control_id, "relay_1");
    assert_eq!(status.value, json!(true));
    assert!(status.success);
    assert!(status.error.is_none());
}

#[tokio::test]
async fn test_repeated_command_is_idempotent() {
    let gpio = Arc::new(RecordingGpio::hardware());
    let executor = ControlExecutor::new(controls(), gpio.clone());
    executor.initialize().await;

    gpio.clear();
    executor.handle_command(&command("relay_1", json!(true))).await;
    let after_first = executor.states().await;
    assert_eq!(gpio.commands().len(), 1);

    gpio.clear();
    executor.handle_command(&command("relay_1", json!(true))).await;
    assert_eq!(executor.states().await, after_first);
    assert_eq!(gpio.commands(), vec![GpioCommand::Write { pin: 22, state: PinState::High }]);
}

#[tokio::test]
async fn test_inverted_control_polarity() {
    let gpio = Arc::new(RecordingGpio::hardware());
    let executor = ControlExecutor::new(controls(), gpio.clone());

    executor.initialize().await;
    // logical default false drives an inverted pin high
    assert!(gpio.commands().contains(&GpioCommand::Write { pin: 16, state: PinState::High }));
    gpio.clear();

    let status = executor.handle_command(&command("led_builtin", json!(true))).await;
    assert_eq!(gpio.commands(), vec![GpioCommand::Write { pin: 16, state: PinState::Low }]);
    assert_eq!(executor.state("led_builtin").await, Some(json!(true)));
    assert!(status.success);
}

#[tokio::test]
async fn test_pwm_value_is_clamped() {
    let gpio = Arc::new(RecordingGpio::hardware());
    let executor = ControlExecutor::new(controls(), gpio.clone());
    executor.initialize().await;
    gpio.clear();

    let status = executor.handle_command(&command("fan_pwm", json!(400))).await;
    assert_eq!(gpio.commands(), vec![GpioCommand::Pwm { pin: 18, duty: 255 }]);
    assert_eq!(status.value, json!(255));
    assert_eq!(executor.state("fan_pwm").await, Some(json!(255)));
}

#[tokio::test]
async fn test_unknown_and_disabled_controls_are_nacked() {
    let gpio = Arc::new(RecordingGpio::hardware());
    let executor = ControlExecutor::new(controls(), gpio.clone());
    executor.initialize().await;
    gpio.clear();

    let missing = executor.handle_command(&command("nope", json!(true))).await;
    let disabled = executor.handle_command(&command("spare", json!(true))).await;

    assert!(!missing.success);
    assert!(missing.error.is_some());
    assert!(!disabled.success);
    assert!(gpio.commands().is_empty());
    assert_eq!(executor.state("spare").await, None);
}

#[tokio::test]
async fn test_invalid_value_is_nacked_without_write() {
    let gpio = Arc::new(RecordingGpio::hardware());
    let executor = ControlExecutor::new(controls(), gpio.clone());
    executor.initialize().await;
    gpio.clear();

    let status = executor.handle_command(&command("relay_1", json!({"on": true}))).await;
    assert!(!status.success);
    assert!(gpio.commands().is_empty());
    assert_eq!(executor.state("relay_1").await, Some(json!(false)));
}

#[tokio::test]
async fn test_write_failure_still_caches_requested_value() {
    let failing = Arc::new(RecordingGpio::failing_on(&[22]));
    let executor = ControlExecutor::new(controls(), failing.clone());
    let status = executor.handle_command(&command("relay_1", json!(true))).await;

    assert!(!status.success);
    assert!(status.error.as_deref().unwrap_or_default().contains("raspi-gpio set 22 dh"));
    assert_eq!(executor.state("relay_1").await, Some(json!(true)));
}

#[tokio::test]
async fn test_setup_failure_skips_control() {
    let gpio = Arc::new(RecordingGpio::failing_on(&[22]));
    let executor = ControlExecutor::new(controls(), gpio.clone());

    executor.initialize().await;
    assert_eq!(executor.state("relay_1").await, None);
    assert_eq!(executor.state("led_builtin").await, Some(json!(false)));
}

#[tokio::test]
async fn test_simulation_never_touches_gpio() {
    let gpio = Arc::new(RecordingGpio::simulation());
    let executor = ControlExecutor::new(controls(), gpio.clone());

    executor.initialize().await;
    let status = executor.handle_command(&command("relay_1", json!("1"))).await;
    executor.cleanup().await;

    assert!(status.success);
    assert_eq!(executor.state("relay_1").await, Some(json!(true)));
    assert!(gpio.commands().is_empty());
}

#[tokio::test]
async fn test_cleanup_drives_logical_off() {
    let gpio = Arc::new(RecordingGpio::hardware());
    let executor = ControlExecutor::new(controls(), gpio.clone());
    executor.initialize().await;
    executor.handle_command(&command("relay_1", json!(true))).await;
    executor.handle_command(&command("led_builtin", json!(true))).await;
    gpio.clear();

    executor.cleanup().await;
    let commands = gpio.commands();
    assert!(commands.contains(&GpioCommand::Write { pin: 22, state: PinState::Low }));
    assert!(commands.contains(&GpioCommand::Write { pin: 16, state: PinState::High }));
    assert!(commands.contains(&GpioCommand::Pwm { pin: 18, duty: 0 }));
    assert_eq!(executor.state("relay_1").await, Some(json!(false)));
}
