//! Startup without an auth code

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;
use trail_api::models::{AuthCodeResponse, CreateDeviceRequest, LoginRequest, LoginResponse};

use trailcommand::app::run::bootstrap_auth;
use trailcommand::app::state::RuntimeContext;
use trailcommand::authn::device_auth::DeviceAuthApi;
use trailcommand::authn::fsm::AuthState;
use trailcommand::errors::TrailError;
use trailcommand::http::devices::DeviceCreation;
use trailcommand::realtime::events::OutboundEvent;
use trailcommand::storage::config::EdgeConfig;
use trailcommand::workers::device_link::{run, Options};

use crate::support::{channel_transport, RecordingGpio};

/// Server that refuses every login
#[derive(Default)]
struct UnreachableAuthApi {
    logins: Mutex<Vec<LoginRequest>>,
}

#[async_trait]
impl DeviceAuthApi for UnreachableAuthApi {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, TrailError> {
        self.logins.lock().unwrap().push(request.clone());
        Err(TrailError::StatusError {
            status: 401,
            body: "invalid credentials".to_string(),
        })
    }

    async fn create_device(
        &self,
        _token: &str,
        _request: &CreateDeviceRequest,
    ) -> Result<DeviceCreation, TrailError> {
        unreachable!("no device creation without a login")
    }

    async fn request_auth_code(
        &self,
        _token: &str,
        _device_id: &str,
    ) -> Result<AuthCodeResponse, TrailError> {
        unreachable!("no auth code without a login")
    }
}

#[tokio::test]
async fn test_setup_failure_connects_with_null_auth_code() {
    let api = Arc::new(UnreachableAuthApi::default());
    let context = RuntimeContext::with_parts(
        EdgeConfig::default(),
        Arc::new(RecordingGpio::simulation()),
        api.clone(),
    );

    let initial = bootstrap_auth(&context).await;
    assert!(initial.is_none());
    assert_eq!(context.authenticator.state().await, AuthState::AuthenticatedNoCode);

    // email first, then username
    let logins = api.logins.lock().unwrap().clone();
    assert_eq!(logins.len(), 2);
    assert!(logins[0].email.is_some());
    assert!(logins[1].username.is_some());

    let (_codes_tx, codes_rx) = watch::channel(initial);
    let (transport, mut handle) = channel_transport();
    let transport = Mutex::new(Some(transport));
    let options = Options {
        max_reconnect_attempts: 1,
        ..Options::default()
    };

    let worker = run(
        &options,
        Arc::new(context.device_link()),
        codes_rx,
        || {
            let next = transport.lock().unwrap().take();
            async move {
                next.ok_or_else(|| TrailError::RealtimeError("refused".to_string()))
            }
        },
        |_| std::future::ready(()),
        Box::pin(std::future::pending::<()>()),
    );

    let observer = async move {
        let event = handle.next_emitted().await;
        // end the session so the worker exhausts its single retry
        drop(handle);
        event
    };

    let (result, event) = tokio::join!(worker, observer);
    assert!(result.is_err());
    match event {
        OutboundEvent::DeviceAuthenticate(auth) => {
            assert!(auth.auth_code.is_none());
            let payload = OutboundEvent::DeviceAuthenticate(auth).payload().unwrap();
            assert!(payload["auth_code"].is_null());
        }
        other => panic!("expected device-authenticate, got {:?}", other),
    }
}
