//! Push listener tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use secrecy::SecretString;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use trail_api::models::{ControlStateUpdate, DeviceRecord, DeviceStatus, DeviceStatusEvent, UserAuthenticate};

use trailcommand::dashboard::push::{self, Options};
use trailcommand::dashboard::session::DashboardSession;
use trailcommand::dashboard::widgets::{Binding, GridRect, Widget, WidgetKind};
use trailcommand::errors::TrailError;
use trailcommand::realtime::events::{InboundEvent, OutboundEvent};

use crate::support::{channel_transport, values_by_id, ChannelTransport, FakeDashboardApi, TransportHandle};

fn fast_options() -> Options {
    Options {
        debounce: Duration::from_millis(10),
        cooldown: Duration::from_millis(50),
        health_timeout: Duration::from_secs(1),
    }
}

fn relay_widget() -> Widget {
    Widget {
        id: "relay".to_string(),
        kind: WidgetKind::Button,
        name: "Relay".to_string(),
        device_id: "dev-1".to_string(),
        binding: Binding::Control("relay_1".to_string()),
        position: GridRect::cell(0),
        config: Value::Null,
        value: json!(false),
    }
}

/// Transports handed out in order, plus the origins and tokens they were
/// requested with
#[derive(Default)]
struct Connector {
    transports: Mutex<VecDeque<ChannelTransport>>,
    origins: Mutex<Vec<String>>,
    tokens: Mutex<Vec<String>>,
}

impl Connector {
    fn with_transports(count: usize) -> (Arc<Self>, Vec<TransportHandle>) {
        let connector = Arc::new(Self::default());
        let mut handles = Vec::new();
        for _ in 0..count {
            let (transport, handle) = channel_transport();
            connector.transports.lock().unwrap().push_back(transport);
            handles.push(handle);
        }
        (connector, handles)
    }

    fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }

    fn origins(&self) -> Vec<String> {
        self.origins.lock().unwrap().clone()
    }
}

const SERVER: &str = "http://127.0.0.1:3000";

fn spawn_listener(
    session: Arc<DashboardSession>,
    connector: Arc<Connector>,
) -> (oneshot::Sender<()>, JoinHandle<()>) {
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        push::run(
            &fast_options(),
            session,
            move |origin: String, token: String| {
                let connector = connector.clone();
                async move {
                    connector.origins.lock().unwrap().push(origin);
                    connector.tokens.lock().unwrap().push(token);
                    connector
                        .transports
                        .lock()
                        .unwrap()
                        .pop_front()
                        .ok_or_else(|| TrailError::RealtimeError("no transport".to_string()))
                }
            },
            tokio::time::sleep,
            Box::pin(async move {
                let _ = stop_rx.await;
            }),
        )
        .await
    });
    (stop_tx, handle)
}

async fn stop(stop_tx: oneshot::Sender<()>, handle: JoinHandle<()>) {
    let _ = stop_tx.send(());
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("push listener did not stop")
        .unwrap();
}

async fn eventually<F, Fut>(check: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_unhealthy_server_is_never_connected() {
    let api = Arc::new(FakeDashboardApi::default());
    let session = Arc::new(DashboardSession::new(api.clone()));
    session.set_server(SERVER);
    session.set_token(SecretString::from("user-token"));
    let (connector, _handles) = Connector::with_transports(1);

    let (stop_tx, handle) = spawn_listener(session, connector.clone());
    let api_ref = &api;
    eventually(move || async move { api_ref.calls().iter().any(|c| c == "GET /health") }).await;
    stop(stop_tx, handle).await;

    assert!(connector.tokens().is_empty());
}

#[tokio::test]
async fn test_waits_for_a_token() {
    let api = Arc::new(FakeDashboardApi::default());
    *api.healthy.lock().unwrap() = true;
    let session = Arc::new(DashboardSession::new(api.clone()));
    session.set_server(SERVER);
    let (connector, mut handles) = Connector::with_transports(1);

    let (stop_tx, handle) = spawn_listener(session.clone(), connector.clone());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(api.calls().is_empty());

    session.set_token(SecretString::from("late-token"));
    assert_eq!(
        handles[0].next_emitted().await,
        OutboundEvent::Authenticate(UserAuthenticate {
            token: "late-token".to_string()
        })
    );
    stop(stop_tx, handle).await;
}

#[tokio::test]
async fn test_pushed_events_reach_the_session() {
    let api = Arc::new(FakeDashboardApi::default());
    *api.healthy.lock().unwrap() = true;
    let session = Arc::new(DashboardSession::new(api.clone()));
    session.set_server(SERVER);
    session.set_token(SecretString::from("user-token"));
    session
        .add_devices(vec![DeviceRecord {
            device_id: "dev-1".to_string(),
            uuid: Some("u-1".to_string()),
            name: "Rig".to_string(),
            status: DeviceStatus::Offline,
            sensors: vec![],
            controls: vec![],
            auth_enabled: true,
        }])
        .await;
    session.select_device("dev-1", Some(vec![relay_widget()])).await.unwrap();
    let (connector, mut handles) = Connector::with_transports(1);

    let (stop_tx, handle) = spawn_listener(session.clone(), connector.clone());
    assert_eq!(
        handles[0].next_emitted().await,
        OutboundEvent::Authenticate(UserAuthenticate {
            token: "user-token".to_string()
        })
    );
    assert_eq!(connector.tokens(), vec!["user-token"]);

    let inbound = &handles[0].inbound;
    inbound.send(InboundEvent::AuthSuccess(json!({}))).unwrap();
    inbound
        .send(InboundEvent::ControlStateUpdate(ControlStateUpdate {
            device_id: "dev-1".to_string(),
            control_id: "relay_1".to_string(),
            value: json!(1),
        }))
        .unwrap();
    inbound
        .send(InboundEvent::DeviceStatus(DeviceStatusEvent {
            kind: Some("device_online".to_string()),
            device_id: Some("dev-1".to_string()),
            controls: Some(vec!["relay_1".to_string()]),
            ..Default::default()
        }))
        .unwrap();

    let session_ref = &session;
    eventually(move || async move {
        values_by_id(&session_ref.widgets().await)["relay"] == json!(true)
            && session_ref.devices().await[0].status == DeviceStatus::Online
    })
    .await;
    assert_eq!(session.control_options().await[0].control_id, "relay_1");

    stop(stop_tx, handle).await;
}

#[tokio::test]
async fn test_token_change_reconnects() {
    let api = Arc::new(FakeDashboardApi::default());
    *api.healthy.lock().unwrap() = true;
    let session = Arc::new(DashboardSession::new(api.clone()));
    session.set_server(SERVER);
    session.set_token(SecretString::from("first"));
    let (connector, mut handles) = Connector::with_transports(2);

    let (stop_tx, handle) = spawn_listener(session.clone(), connector.clone());
    assert!(matches!(
        handles[0].next_emitted().await,
        OutboundEvent::Authenticate(ref auth) if auth.token == "first"
    ));

    session.set_token(SecretString::from("second"));
    assert!(matches!(
        handles[1].next_emitted().await,
        OutboundEvent::Authenticate(ref auth) if auth.token == "second"
    ));
    assert_eq!(connector.tokens(), vec!["first", "second"]);

    stop(stop_tx, handle).await;
}

#[tokio::test]
async fn test_waits_for_a_server() {
    let api = Arc::new(FakeDashboardApi::default());
    *api.healthy.lock().unwrap() = true;
    let session = Arc::new(DashboardSession::new(api.clone()));
    session.set_token(SecretString::from("user-token"));
    let (connector, mut handles) = Connector::with_transports(1);

    let (stop_tx, handle) = spawn_listener(session.clone(), connector.clone());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(api.calls().is_empty());

    session.set_server(SERVER);
    handles[0].next_emitted().await;
    assert_eq!(connector.origins(), vec![SERVER]);
    stop(stop_tx, handle).await;
}

#[tokio::test]
async fn test_server_change_reconnects() {
    let api = Arc::new(FakeDashboardApi::default());
    *api.healthy.lock().unwrap() = true;
    let session = Arc::new(DashboardSession::new(api.clone()));
    session.set_server(SERVER);
    session.set_token(SecretString::from("user-token"));
    let (connector, mut handles) = Connector::with_transports(2);

    let (stop_tx, handle) = spawn_listener(session.clone(), connector.clone());
    handles[0].next_emitted().await;

    // same origin again is not a change
    session.set_server(SERVER);
    session.set_server("http://10.0.0.7:4000");
    assert!(matches!(
        handles[1].next_emitted().await,
        OutboundEvent::Authenticate(ref auth) if auth.token == "user-token"
    ));
    assert_eq!(connector.origins(), vec![SERVER, "http://10.0.0.7:4000"]);
    assert_eq!(connector.tokens(), vec!["user-token", "user-token"]);

    stop(stop_tx, handle).await;
}

#[tokio::test]
async fn test_closed_channel_reconnects_after_cooldown() {
    let api = Arc::new(FakeDashboardApi::default());
    *api.healthy.lock().unwrap() = true;
    let session = Arc::new(DashboardSession::new(api.clone()));
    session.set_server(SERVER);
    session.set_token(SecretString::from("user-token"));
    let (connector, mut handles) = Connector::with_transports(2);

    let (stop_tx, handle) = spawn_listener(session.clone(), connector.clone());
    handles[0].next_emitted().await;

    // dropping the test side ends the first session
    let first = handles.remove(0);
    drop(first);
    handles[0].next_emitted().await;
    assert_eq!(connector.tokens().len(), 2);

    stop(stop_tx, handle).await;
}
