//! Push listener worker
//!
//! Keeps one realtime connection per signed-in dashboard session and feeds
//! normalized push events into it. A token or server change tears the
//! connection down and reconnects through the [`ConnectGate`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use trail_api::models::UserAuthenticate;

use crate::dashboard::gate::{ConnectGate, GateDecision};
use crate::dashboard::session::DashboardSession;
use crate::errors::TrailError;
use crate::realtime::events::{InboundEvent, OutboundEvent, PushEvent};
use crate::realtime::socket::RealtimeTransport;

/// Push listener options
#[derive(Debug, Clone)]
pub struct Options {
    pub debounce: Duration,
    pub cooldown: Duration,
    pub health_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            cooldown: Duration::from_secs(5),
            health_timeout: Duration::from_secs(5),
        }
    }
}

/// Connection inputs watched by the listener
struct Inputs {
    token: watch::Receiver<Option<SecretString>>,
    server: watch::Receiver<Option<String>>,
}

impl Inputs {
    /// Current origin and token, marking both as seen
    fn current(&mut self) -> Option<(String, SecretString)> {
        let token = self.token.borrow_and_update().clone();
        let server = self.server.borrow_and_update().clone();
        Some((server?, token?))
    }

    /// Wait until the token or the server changes. False once either
    /// sender is gone.
    async fn changed(&mut self) -> bool {
        tokio::select! {
            changed = self.token.changed() => changed.is_ok(),
            changed = self.server.changed() => changed.is_ok(),
        }
    }
}

/// Run the push listener until shutdown. `connect_fn` receives the server
/// origin and the user token and returns a connected transport.
pub async fn run<C, CF, T, S, F>(
    options: &Options,
    session: Arc<DashboardSession>,
    connect_fn: C,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    C: Fn(String, String) -> CF,
    CF: Future<Output = Result<T, TrailError>>,
    T: RealtimeTransport,
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Push listener starting...");
    let mut gate = ConnectGate::new(options.debounce, options.cooldown);
    let mut inputs = Inputs {
        token: session.subscribe_token(),
        server: session.subscribe_server(),
    };

    loop {
        let Some((origin, token)) = inputs.current() else {
            tokio::select! {
                _ = &mut shutdown_signal => break,
                alive = inputs.changed() => {
                    if !alive {
                        break;
                    }
                }
            }
            continue;
        };

        let ticket = gate.request();
        tokio::select! {
            _ = &mut shutdown_signal => break,
            alive = inputs.changed() => {
                if !alive {
                    break;
                }
                debug!("Token or server changed during debounce, restarting");
                continue;
            }
            _ = sleep_fn(gate.debounce()) => {}
        }

        match gate.begin(ticket, Instant::now()) {
            GateDecision::Proceed => {}
            GateDecision::CoolingDown(remaining) => {
                debug!("Reconnect cooling down for {:?}", remaining);
                tokio::select! {
                    _ = &mut shutdown_signal => break,
                    alive = inputs.changed() => {
                        if !alive {
                            break;
                        }
                    }
                    _ = sleep_fn(remaining) => {}
                }
                continue;
            }
            GateDecision::Superseded | GateDecision::InFlight => continue,
        }

        let stop = connect_and_listen(
            options,
            &session,
            origin,
            token.expose_secret().to_string(),
            &connect_fn,
            &mut inputs,
            &mut shutdown_signal,
        )
        .await;
        gate.finish();
        if stop {
            break;
        }
    }

    info!("Push listener shutting down...");
}

/// One connection lifetime. Returns true when the listener should stop.
async fn connect_and_listen<C, CF, T>(
    options: &Options,
    session: &DashboardSession,
    origin: String,
    token: String,
    connect_fn: &C,
    inputs: &mut Inputs,
    shutdown_signal: &mut Pin<Box<dyn Future<Output = ()> + Send>>,
) -> bool
where
    C: Fn(String, String) -> CF,
    CF: Future<Output = Result<T, TrailError>>,
    T: RealtimeTransport,
{
    if let Err(e) = session.check_health(options.health_timeout).await {
        warn!(error = %e, "Server health check failed, not connecting");
        return false;
    }

    let mut transport = match connect_fn(origin.clone(), token.clone()).await {
        Ok(transport) => transport,
        Err(e) => {
            error!(origin = %origin, error = %e, "Failed to connect push channel");
            return false;
        }
    };
    if let Err(e) = transport
        .emit(OutboundEvent::Authenticate(UserAuthenticate { token }))
        .await
    {
        error!(error = %e, "Failed to authenticate push channel");
        transport.close().await;
        return false;
    }

    loop {
        tokio::select! {
            _ = &mut *shutdown_signal => {
                transport.close().await;
                return true;
            }
            alive = inputs.changed() => {
                transport.close().await;
                if !alive {
                    return true;
                }
                info!("Session token or server changed, reconnecting push channel");
                return false;
            }
            event = transport.next_event() => match event {
                Ok(Some(event)) => dispatch(session, event).await,
                Ok(None) => {
                    warn!("Push channel closed by server");
                    return false;
                }
                Err(e) => {
                    warn!(error = %e, "Push channel failed");
                    return false;
                }
            }
        }
    }
}

async fn dispatch(session: &DashboardSession, event: InboundEvent) {
    match event {
        InboundEvent::AuthSuccess(_) => info!("Push channel authenticated"),
        InboundEvent::AuthError(payload) => error!(payload = %payload, "Push channel authentication failed"),
        InboundEvent::Error(payload) => warn!(payload = %payload, "Server error on push channel"),
        other => match PushEvent::from_inbound(other) {
            Some(push) => {
                let changes = session.handle_push(push).await;
                for change in changes {
                    info!(widget_id = %change.widget_id, old = %change.old, new = %change.new, "Widget updated from push");
                }
            }
            None => debug!("Ignoring push channel event"),
        },
    }
}
