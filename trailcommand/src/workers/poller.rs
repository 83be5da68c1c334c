//! Polling worker for periodic reconciliation

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info};

/// Whether polling should go on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Continue,
    Stop,
}

/// Something polled on an interval
#[async_trait]
pub trait PollTarget: Send + Sync {
    async fn poll_once(&self) -> PollOutcome;
}

/// Poller worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Polling interval
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
        }
    }
}

/// Run the poller worker. Polls right away and then once per interval.
/// When the target asks to stop, the worker idles until `changes` fires;
/// every change triggers an immediate poll and restarts the interval.
pub async fn run<P, S, F>(
    options: &Options,
    target: &P,
    mut changes: watch::Receiver<u64>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    P: PollTarget + ?Sized,
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Poller worker starting...");
    changes.borrow_and_update();
    let mut active = true;

    loop {
        if active {
            debug!("Polling for updates...");
            if target.poll_once().await == PollOutcome::Stop {
                info!("Poller worker idle: nothing to poll");
                active = false;
            }
        }

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Poller worker shutting down...");
                return;
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    info!("Poll target gone, poller worker stopping");
                    return;
                }
                debug!("Poll target changed, polling now");
                active = true;
            }
            _ = sleep_fn(options.interval), if active => {}
        }
    }
}
