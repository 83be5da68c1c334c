//! Realtime device link worker

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use trail_api::models::{DeviceAuthenticate, DeviceInfo, RegisterDevice, SensorData};

use crate::authn::auth_code::AuthCode;
use crate::control::executor::{rejection, ControlExecutor};
use crate::errors::TrailError;
use crate::realtime::events::{InboundEvent, OutboundEvent};
use crate::realtime::socket::RealtimeTransport;
use crate::sensors::sampler::SensorSampler;
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Device link worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Sensor emission interval
    pub send_interval: Duration,

    /// Consecutive failed connection attempts before giving up
    pub max_reconnect_attempts: u32,

    /// Reconnect backoff
    pub backoff: CooldownOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            send_interval: Duration::from_secs(5),
            max_reconnect_attempts: 10,
            backoff: CooldownOptions::default(),
        }
    }
}

/// What the device announces and serves over the link
pub struct DeviceLink {
    pub device_id: String,
    pub device_info: DeviceInfo,
    pub sensors: Vec<String>,
    pub controls: Vec<String>,
    pub executor: Arc<ControlExecutor>,
    pub sampler: Arc<SensorSampler>,
}

/// How a session ended
#[derive(Debug)]
pub enum SessionEnd {
    Shutdown,
    Disconnected(Option<TrailError>),
}

/// Serve one connected session: authenticate, register, then stream
/// sensor data and execute control commands until the link drops.
pub async fn serve_session<T>(
    transport: &mut T,
    link: &DeviceLink,
    auth_code: Option<String>,
    send_interval: Duration,
    shutdown_signal: &mut Pin<Box<dyn Future<Output = ()> + Send>>,
) -> SessionEnd
where
    T: RealtimeTransport + ?Sized,
{
    let authenticate = OutboundEvent::DeviceAuthenticate(DeviceAuthenticate {
        auth_code,
        device_info: link.device_info.clone(),
    });
    if let Err(e) = transport.emit(authenticate).await {
        return SessionEnd::Disconnected(Some(e));
    }

    let mut registered = false;
    let mut ticker = tokio::time::interval(send_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut *shutdown_signal => {
                info!("Device link shutting down connection...");
                transport.close().await;
                return SessionEnd::Shutdown;
            }
            _ = ticker.tick(), if registered => {
                let readings = link.sampler.sample();
                debug!(count = readings.len(), "Sending sensor data");
                if let Err(e) = transport.emit(OutboundEvent::SensorData(SensorData { readings })).await {
                    return SessionEnd::Disconnected(Some(e));
                }
            }
            event = transport.next_event() => {
                let event = match event {
                    Ok(Some(event)) => event,
                    Ok(None) => return SessionEnd::Disconnected(None),
                    Err(e) => return SessionEnd::Disconnected(Some(e)),
                };

                let reply = match event {
                    InboundEvent::DeviceAuthenticated(_) => {
                        info!(device_id = %link.device_id, "Device authenticated, registering...");
                        Some(OutboundEvent::RegisterDevice(RegisterDevice {
                            device_id: link.device_id.clone(),
                            device_info: link.device_info.clone(),
                            sensors: link.sensors.clone(),
                            controls: link.controls.clone(),
                        }))
                    }
                    InboundEvent::DeviceRegistered(_) => {
                        info!(
                            device_id = %link.device_id,
                            sensors = link.sensors.len(),
                            controls = link.controls.len(),
                            "Device registered, starting sensor data transmission"
                        );
                        registered = true;
                        ticker.reset();
                        None
                    }
                    InboundEvent::ControlCommand(command) => {
                        let status = link.executor.handle_command(&command).await;
                        Some(OutboundEvent::ControlStatus(status))
                    }
                    InboundEvent::InvalidControlCommand { control_id, value, error } => {
                        warn!(control_id = %control_id, error = %error, "Rejecting malformed control command");
                        Some(OutboundEvent::ControlStatus(rejection(&control_id, value, error)))
                    }
                    InboundEvent::DeviceRegistrationError(payload) => {
                        error!(error = %payload, "Device registration failed");
                        None
                    }
                    InboundEvent::DeviceAuthError(payload) | InboundEvent::AuthError(payload) => {
                        error!(error = %payload, "Device authentication failed");
                        None
                    }
                    InboundEvent::Error(payload) => {
                        error!(error = %payload, "Realtime server error");
                        None
                    }
                    other => {
                        debug!(event = ?other, "Ignoring event");
                        None
                    }
                };

                if let Some(reply) = reply {
                    if let Err(e) = transport.emit(reply).await {
                        return SessionEnd::Disconnected(Some(e));
                    }
                }
            }
        }
    }
}

/// The code to present on connect. An expired code is never sent.
pub fn handshake_code(code: Option<&AuthCode>, device_id: &str, now: DateTime<Utc>) -> Option<String> {
    match code {
        Some(code) if code.is_expired(now) => {
            warn!(
                device_id = %device_id,
                code = %code.redacted(),
                expired_at = %code.expires_at(),
                "Auth code expired, connecting without one"
            );
            None
        }
        Some(code) => Some(code.expose().to_string()),
        None => {
            warn!(device_id = %device_id, "No auth code, connecting without one");
            None
        }
    }
}

/// Run the device link worker, reconnecting with backoff. Returns an error
/// once `max_reconnect_attempts` consecutive connection attempts fail.
pub async fn run<T, C, CF, S, F>(
    options: &Options,
    link: Arc<DeviceLink>,
    codes: watch::Receiver<Option<AuthCode>>,
    connect_fn: C,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) -> Result<(), TrailError>
where
    T: RealtimeTransport,
    C: Fn() -> CF,
    CF: Future<Output = Result<T, TrailError>>,
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!(device_id = %link.device_id, "Device link worker starting...");
    let mut failures: u32 = 0;

    loop {
        let auth_code = handshake_code(codes.borrow().as_ref(), &link.device_id, Utc::now());

        let connection = tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Device link worker shutting down...");
                return Ok(());
            }
            connection = connect_fn() => connection,
        };

        match connection {
            Ok(mut transport) => {
                failures = 0;
                info!(device_id = %link.device_id, "Connected to TrailCommand server");
                match serve_session(
                    &mut transport,
                    &link,
                    auth_code,
                    options.send_interval,
                    &mut shutdown_signal,
                )
                .await
                {
                    SessionEnd::Shutdown => return Ok(()),
                    SessionEnd::Disconnected(Some(e)) => {
                        warn!(error = %e, "Disconnected from TrailCommand server")
                    }
                    SessionEnd::Disconnected(None) => warn!("Disconnected from TrailCommand server"),
                }
            }
            Err(e) => {
                failures += 1;
                error!(
                    attempt = failures,
                    max_attempts = options.max_reconnect_attempts,
                    error = %e,
                    "Connection failed"
                );
                if failures >= options.max_reconnect_attempts {
                    return Err(TrailError::RealtimeError(format!(
                        "giving up after {} failed connection attempts",
                        failures
                    )));
                }
            }
        }

        let delay = calc_exp_backoff(&options.backoff, failures.saturating_sub(1));
        debug!("Reconnecting in {:?}...", delay);
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Device link worker shutting down...");
                return Ok(());
            }
            _ = sleep_fn(delay) => {}
        }
    }
}
