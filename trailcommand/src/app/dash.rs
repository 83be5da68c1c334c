//! Dashboard session run loop

use std::future::Future;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::broadcast;
use tracing::info;

use crate::app::options::DashOptions;
use crate::app::run::ShutdownManager;
use crate::dashboard::push;
use crate::dashboard::session::DashboardSession;
use crate::errors::TrailError;
use crate::realtime::socket::RealtimeSocket;
use crate::workers::poller;

/// Keep `session` in sync (poller plus push listener) until shutdown
pub async fn run(
    session: Arc<DashboardSession>,
    options: DashOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), TrailError> {
    info!("Starting dashboard sync session...");
    session.set_server(options.origin.clone());

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    init_poller_worker(session.clone(), &options, &shutdown_tx, &mut shutdown_manager)?;
    init_push_worker(session, &options, &shutdown_tx, &mut shutdown_manager)?;

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

fn init_poller_worker(
    session: Arc<DashboardSession>,
    options: &DashOptions,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), TrailError> {
    info!("Initializing poller worker...");

    let poller_options = options.poller.clone();
    let changes = session.subscribe_changes();
    let mut shutdown_rx = shutdown_tx.subscribe();
    let handle = tokio::spawn(async move {
        poller::run(
            &poller_options,
            session.as_ref(),
            changes,
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_poller_worker_handle(handle)
}

fn init_push_worker(
    session: Arc<DashboardSession>,
    options: &DashOptions,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), TrailError> {
    info!("Initializing push listener...");

    let push_options = options.push.clone();
    let handshake_timeout = options.handshake_timeout;
    let mut shutdown_rx = shutdown_tx.subscribe();
    let handle = tokio::spawn(async move {
        push::run(
            &push_options,
            session,
            |origin: String, token: String| {
                async move {
                    RealtimeSocket::connect(&origin, Some(json!({ "token": token })), handshake_timeout)
                        .await
                }
            },
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_push_worker_handle(handle)
}
