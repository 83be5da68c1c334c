//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::options::{AgentOptions, LifecycleOptions};
use crate::app::state::RuntimeContext;
use crate::authn::auth_code::AuthCode;
use crate::errors::TrailError;
use crate::realtime::socket::RealtimeSocket;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::workers::{auth_renewal, device_link};

/// Run the edge agent until shutdown is signalled or the device link gives up
pub async fn run(
    context: RuntimeContext,
    options: AgentOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), TrailError> {
    info!("Initializing TrailCommand edge agent...");

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let (fatal_tx, mut fatal_rx) = mpsc::channel::<TrailError>(1);
    let context = Arc::new(context);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());
    shutdown_manager.with_context(context.clone())?;

    if let Err(e) = init(&context, &options, &shutdown_tx, fatal_tx, &mut shutdown_manager).await {
        error!("Failed to start edge agent: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    let fatal = tokio::select! {
        _ = shutdown_signal => {
            info!("Shutdown signal received, shutting down...");
            None
        }
        fatal = fatal_rx.recv() => {
            let e = fatal.unwrap_or_else(|| {
                TrailError::Internal("device link worker stopped unexpectedly".to_string())
            });
            error!(error = %e, "Edge agent cannot continue, shutting down...");
            Some(e)
        }
    };

    drop(shutdown_tx);
    shutdown_manager.shutdown().await?;
    match fatal {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

// =============================== INITIALIZATION ================================== //

async fn init(
    context: &Arc<RuntimeContext>,
    options: &AgentOptions,
    shutdown_tx: &broadcast::Sender<()>,
    fatal_tx: mpsc::Sender<TrailError>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), TrailError> {
    info!(mode = ?context.executor.mode(), "Initializing controls...");
    context.executor.initialize().await;

    let initial = bootstrap_auth(context).await;
    let (codes_tx, codes_rx) = watch::channel(initial.clone());

    if let Some(code) = initial {
        init_auth_renewal_worker(
            context.clone(),
            options.auth_renewal.clone(),
            code,
            codes_tx,
            shutdown_manager,
            shutdown_tx.subscribe(),
        )?;
    }

    init_device_link_worker(
        context,
        options,
        codes_rx,
        fatal_tx,
        shutdown_manager,
        shutdown_tx.subscribe(),
    )?;

    if let Some(server_options) = &options.server {
        info!("Initializing local status server...");
        let state = Arc::new(ServerState::new(
            context.config.device.id.clone(),
            context.executor.clone(),
        ));
        let mut shutdown_rx = shutdown_tx.subscribe();
        let handle = serve(server_options, state, async move {
            let _ = shutdown_rx.recv().await;
        })
        .await?;
        shutdown_manager.with_socket_server_handle(handle)?;
    }

    Ok(())
}

/// Run the device setup. A failure leaves the agent in degraded mode: it
/// still connects, without an auth code.
pub async fn bootstrap_auth(context: &RuntimeContext) -> Option<AuthCode> {
    match context.authenticator.setup().await {
        Ok(code) => {
            info!(auth_code = %code.redacted(), expires_at = %code.expires_at(), "Device authenticated");
            Some(code)
        }
        Err(e) => {
            warn!(error = %e, "Continuing without an auth code");
            None
        }
    }
}

fn init_auth_renewal_worker(
    context: Arc<RuntimeContext>,
    options: auth_renewal::Options,
    initial: AuthCode,
    codes: watch::Sender<Option<AuthCode>>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), TrailError> {
    info!("Initializing auth renewal worker...");

    let handle = tokio::spawn(async move {
        auth_renewal::run(
            &options,
            context.authenticator.as_ref(),
            initial,
            codes,
            chrono::Utc::now,
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_auth_renewal_worker_handle(handle)
}

fn init_device_link_worker(
    context: &RuntimeContext,
    options: &AgentOptions,
    codes: watch::Receiver<Option<AuthCode>>,
    fatal_tx: mpsc::Sender<TrailError>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), TrailError> {
    info!("Initializing device link worker...");

    let link = Arc::new(context.device_link());
    let link_options = options.device_link.clone();
    let origin = options.origin.clone();
    let handshake_timeout = options.handshake_timeout;

    let handle = tokio::spawn(async move {
        let result = device_link::run(
            &link_options,
            link,
            codes,
            || {
                let origin = origin.clone();
                async move { RealtimeSocket::connect(&origin, None, handshake_timeout).await }
            },
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
        if let Err(e) = result {
            let _ = fatal_tx.send(e).await;
        }
    });

    shutdown_manager.with_device_link_worker_handle(handle)
}

// ================================= SHUTDOWN ===================================== //

pub(crate) struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    context: Option<Arc<RuntimeContext>>,
    socket_server_handle: Option<JoinHandle<Result<(), TrailError>>>,
    auth_renewal_worker_handle: Option<JoinHandle<()>>,
    device_link_worker_handle: Option<JoinHandle<()>>,
    poller_worker_handle: Option<JoinHandle<()>>,
    push_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            context: None,
            socket_server_handle: None,
            auth_renewal_worker_handle: None,
            device_link_worker_handle: None,
            poller_worker_handle: None,
            push_worker_handle: None,
        }
    }

    pub fn with_context(&mut self, context: Arc<RuntimeContext>) -> Result<(), TrailError> {
        if self.context.is_some() {
            return Err(TrailError::ShutdownError("context already set".to_string()));
        }
        self.context = Some(context);
        Ok(())
    }

    pub fn with_auth_renewal_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), TrailError> {
        if self.auth_renewal_worker_handle.is_some() {
            return Err(TrailError::ShutdownError("auth_renewal_handle already set".to_string()));
        }
        self.auth_renewal_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_device_link_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), TrailError> {
        if self.device_link_worker_handle.is_some() {
            return Err(TrailError::ShutdownError("device_link_handle already set".to_string()));
        }
        self.device_link_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_poller_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), TrailError> {
        if self.poller_worker_handle.is_some() {
            return Err(TrailError::ShutdownError("poller_handle already set".to_string()));
        }
        self.poller_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_push_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), TrailError> {
        if self.push_worker_handle.is_some() {
            return Err(TrailError::ShutdownError("push_handle already set".to_string()));
        }
        self.push_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_socket_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), TrailError>>,
    ) -> Result<(), TrailError> {
        if self.socket_server_handle.is_some() {
            return Err(TrailError::ShutdownError("server_handle already set".to_string()));
        }
        self.socket_server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), TrailError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), TrailError> {
        info!("Shutting down...");
        let mut first_error = None;

        // 1. Workers
        let workers = [
            self.auth_renewal_worker_handle.take(),
            self.device_link_worker_handle.take(),
            self.poller_worker_handle.take(),
            self.push_worker_handle.take(),
        ];
        for handle in workers.into_iter().flatten() {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task failed");
                first_error.get_or_insert(TrailError::ShutdownError(e.to_string()));
            }
        }

        // 2. Status server
        if let Some(handle) = self.socket_server_handle.take() {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "Status server failed");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    error!(error = %e, "Status server task failed");
                    first_error.get_or_insert(TrailError::ShutdownError(e.to_string()));
                }
            }
        }

        // 3. Hardware, after everything that could still write to it
        if let Some(context) = self.context.take() {
            context.shutdown().await?;
        }

        info!("Shutdown complete");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
