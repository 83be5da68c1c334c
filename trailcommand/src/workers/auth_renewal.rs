//! Auth code renewal worker

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::authn::auth_code::{AuthCode, LateRenewalPolicy};
use crate::authn::device_auth::CodeRenewer;

/// Auth renewal worker options
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Behaviour when the renewal instant has already passed
    pub late_renewal: LateRenewalPolicy,
}

/// When the next renewal should happen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalPlan {
    After(Duration),
    Immediately,
    NotArmed,
}

/// Decide when to renew `code`
pub fn plan_renewal(code: &AuthCode, now: DateTime<Utc>, policy: LateRenewalPolicy) -> RenewalPlan {
    match code.renewal_delay(now) {
        Some(delay) => RenewalPlan::After(delay),
        None => match policy {
            LateRenewalPolicy::Skip => RenewalPlan::NotArmed,
            LateRenewalPolicy::Immediate => RenewalPlan::Immediately,
        },
    }
}

/// Run the renewal worker. Each successful renewal is published on `codes`
/// and schedules the next one; a failed renewal arms nothing further.
pub async fn run<R, C, S, F>(
    options: &Options,
    renewer: &R,
    initial: AuthCode,
    codes: watch::Sender<Option<AuthCode>>,
    now_fn: C,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    R: CodeRenewer + ?Sized,
    C: Fn() -> DateTime<Utc>,
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Auth renewal worker starting...");

    let mut code = initial;
    let mut renewed_late = false;

    loop {
        let wait = match plan_renewal(&code, now_fn(), options.late_renewal) {
            RenewalPlan::After(delay) => {
                debug!(renewal_at = %code.renewal_at().to_rfc3339(), "Auth code renewal scheduled");
                renewed_late = false;
                delay
            }
            RenewalPlan::Immediately if !renewed_late => {
                warn!(expires = %code.expires_at().to_rfc3339(), "Auth code renewal is overdue, renewing now");
                renewed_late = true;
                Duration::ZERO
            }
            RenewalPlan::Immediately | RenewalPlan::NotArmed => {
                warn!(
                    expires = %code.expires_at().to_rfc3339(),
                    "Auth code expires within the renewal margin, no renewal armed"
                );
                return;
            }
        };

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Auth renewal worker shutting down...");
                return;
            }
            _ = sleep_fn(wait) => {}
        }

        match renewer.renew().await {
            Ok(new_code) => {
                info!(
                    auth_code = %new_code.redacted(),
                    expires = %new_code.expires_at().to_rfc3339(),
                    "Auth code renewed"
                );
                codes.send_replace(Some(new_code.clone()));
                code = new_code;
            }
            Err(e) => {
                error!(error = %e, "Failed to renew auth code, keeping the current one");
                return;
            }
        }
    }
}
