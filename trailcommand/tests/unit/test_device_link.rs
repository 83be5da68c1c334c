//! Device link worker tests

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use tokio::sync::{oneshot, watch};
use trail_api::models::{ControlCommand, DeviceInfo};

use trailcommand::authn::auth_code::AuthCode;
use trailcommand::control::executor::ControlExecutor;
use trailcommand::errors::TrailError;
use trailcommand::realtime::events::{InboundEvent, OutboundEvent};
use trailcommand::sensors::sampler::SensorSampler;
use trailcommand::storage::config::{ControlConfig, SensorConfig};
use trailcommand::utils::CooldownOptions;
use trailcommand::workers::device_link::{
    handshake_code, run, serve_session, DeviceLink, Options, SessionEnd,
};

use crate::support::{channel_transport, ChannelTransport, RecordingGpio};

async fn link() -> (Arc<DeviceLink>, Arc<RecordingGpio>) {
    let gpio = Arc::new(RecordingGpio::hardware());
    let controls = BTreeMap::from([(
        "relay_1".to_string(),
        ControlConfig::digital(22, "Main relay control"),
    )]);
    let executor = Arc::new(ControlExecutor::new(controls, gpio.clone()));
    executor.initialize().await;
    gpio.clear();

    let sensors = BTreeMap::from([("temperature".to_string(), SensorConfig::simulated(18.0, 35.0))]);
    let link = DeviceLink {
        device_id: "dev-1".to_string(),
        device_info: DeviceInfo {
            name: "Test rig".to_string(),
            device_type: "raspberry_pi".to_string(),
            description: "bench".to_string(),
            uuid: "uuid-1".to_string(),
        },
        sensors: vec!["temperature".to_string()],
        controls: vec!["relay_1".to_string()],
        executor,
        sampler: Arc::new(SensorSampler::new(sensors)),
    };
    (Arc::new(link), gpio)
}

#[tokio::test]
async fn test_session_authenticates_registers_and_serves_commands() {
    let (link, gpio) = link().await;
    let (mut transport, mut handle) = channel_transport();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let session_link = link.clone();
    let session = tokio::spawn(async move {
        let mut shutdown: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(async move {
            let _ = stop_rx.await;
        });
        serve_session(
            &mut transport,
            &session_link,
            Some("code-123".to_string()),
            Duration::from_millis(20),
            &mut shutdown,
        )
        .await
    });

    match handle.next_emitted().await {
        OutboundEvent::DeviceAuthenticate(auth) => {
            assert_eq!(auth.auth_code.as_deref(), Some("code-123"));
            assert_eq!(auth.device_info.uuid, "uuid-1");
        }
        other => panic!("expected device-authenticate, got {:?}", other),
    }

    handle.inbound.send(InboundEvent::DeviceAuthenticated(json!({}))).unwrap();
    match handle.next_emitted().await {
        OutboundEvent::RegisterDevice(register) => {
            assert_eq!(register.device_id, "dev-1");
            assert_eq!(register.sensors, vec!["temperature"]);
            assert_eq!(register.controls, vec!["relay_1"]);
        }
        other => panic!("expected register-device, got {:?}", other),
    }

    handle.inbound.send(InboundEvent::DeviceRegistered(json!({}))).unwrap();
    match handle.next_emitted().await {
        OutboundEvent::SensorData(data) => {
            assert_eq!(data.readings.len(), 1);
            assert_eq!(data.readings[0].sensor_id, "temperature");
            assert_eq!(data.readings[0].quality, Some(100));
        }
        other => panic!("expected sensor-data, got {:?}", other),
    }

    handle
        .inbound
        .send(InboundEvent::ControlCommand(ControlCommand {
            control_id: "relay_1".to_string(),
            value: json!(true),
        }))
        .unwrap();
    let status = loop {
        if let OutboundEvent::ControlStatus(status) = handle.next_emitted().await {
            break status;
        }
    };
    assert_eq!(status.control_id, "relay_1");
    assert_eq!(status.value, json!(true));
    assert!(status.success);
    assert_eq!(gpio.commands().len(), 1);

    stop_tx.send(()).unwrap();
    assert!(matches!(session.await.unwrap(), SessionEnd::Shutdown));
}

#[tokio::test]
async fn test_no_sensor_data_before_registration() {
    let (link, _gpio) = link().await;
    let (mut transport, mut handle) = channel_transport();

    let session = tokio::spawn(async move {
        let mut shutdown: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(std::future::pending::<()>());
        serve_session(&mut transport, &link, None, Duration::from_millis(5), &mut shutdown).await
    });

    assert!(matches!(handle.next_emitted().await, OutboundEvent::DeviceAuthenticate(_)));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(handle.outbound.try_recv().is_err());

    // dropping the peer ends the session
    drop(handle);
    assert!(matches!(session.await.unwrap(), SessionEnd::Disconnected(None)));
}

#[tokio::test]
async fn test_gives_up_after_max_reconnect_attempts() {
    let (link, _gpio) = link().await;
    let (_codes_tx, codes_rx) = watch::channel(None);
    let attempts = AtomicU32::new(0);
    let options = Options {
        send_interval: Duration::from_secs(5),
        max_reconnect_attempts: 3,
        backoff: CooldownOptions::default(),
    };

    let result = run(
        &options,
        link,
        codes_rx,
        || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<ChannelTransport, _>(TrailError::RealtimeError("refused".to_string())) }
        },
        |_| std::future::ready(()),
        Box::pin(std::future::pending::<()>()),
    )
    .await;

    assert!(matches!(result, Err(TrailError::RealtimeError(_))));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_shutdown_stops_reconnecting() {
    let (link, _gpio) = link().await;
    let (_codes_tx, codes_rx) = watch::channel(None);

    let result = run(
        &Options::default(),
        link,
        codes_rx,
        || async { Err::<ChannelTransport, _>(TrailError::RealtimeError("refused".to_string())) },
        |_| std::future::pending::<()>(),
        Box::pin(std::future::ready(())),
    )
    .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_malformed_command_gets_a_negative_ack() {
    let (link, gpio) = link().await;
    let (mut transport, mut handle) = channel_transport();

    let session = tokio::spawn(async move {
        let mut shutdown: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(std::future::pending::<()>());
        serve_session(&mut transport, &link, None, Duration::from_secs(60), &mut shutdown).await
    });
    assert!(matches!(handle.next_emitted().await, OutboundEvent::DeviceAuthenticate(_)));

    let event = InboundEvent::from_wire("control-command", json!({"controlId": "relay_1"})).unwrap();
    handle.inbound.send(event).unwrap();
    match handle.next_emitted().await {
        OutboundEvent::ControlStatus(status) => {
            assert_eq!(status.control_id, "relay_1");
            assert_eq!(status.value, Value::Null);
            assert!(!status.success);
            assert!(status.error.is_some());
        }
        other => panic!("expected control_status, got {:?}", other),
    }
    assert!(gpio.commands().is_empty());

    drop(handle);
    assert!(matches!(session.await.unwrap(), SessionEnd::Disconnected(None)));
}

#[test]
fn test_handshake_code_withholds_expired_codes() {
    let now = Utc::now();
    let fresh = AuthCode::new("fresh-code", now + ChronoDuration::minutes(5));
    let stale = AuthCode::new("stale-code", now - ChronoDuration::seconds(1));
    let at_expiry = AuthCode::new("edge-code", now);

    assert_eq!(handshake_code(Some(&fresh), "dev-1", now).as_deref(), Some("fresh-code"));
    assert_eq!(handshake_code(Some(&stale), "dev-1", now), None);
    assert_eq!(handshake_code(Some(&at_expiry), "dev-1", now), None);
    assert_eq!(handshake_code(None, "dev-1", now), None);
}

#[tokio::test]
async fn test_expired_code_is_not_sent_on_connect() {
    let (link, _gpio) = link().await;
    let expired = AuthCode::new("old-code", Utc::now() - ChronoDuration::minutes(1));
    let (_codes_tx, codes_rx) = watch::channel(Some(expired));
    let (transport, mut handle) = channel_transport();
    let slot = Arc::new(Mutex::new(Some(transport)));
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let worker = tokio::spawn(async move {
        run(
            &Options::default(),
            link,
            codes_rx,
            move || {
                let transport = slot.lock().unwrap().take();
                async move { transport.ok_or_else(|| TrailError::RealtimeError("refused".to_string())) }
            },
            |_| std::future::pending::<()>(),
            Box::pin(async move {
                let _ = stop_rx.await;
            }),
        )
        .await
    });

    match handle.next_emitted().await {
        OutboundEvent::DeviceAuthenticate(auth) => assert_eq!(auth.auth_code, None),
        other => panic!("expected device-authenticate, got {:?}", other),
    }

    stop_tx.send(()).unwrap();
    assert!(worker.await.unwrap().is_ok());
}
