//! Auth renewal worker tests

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;

use trailcommand::authn::auth_code::{AuthCode, LateRenewalPolicy};
use trailcommand::authn::device_auth::CodeRenewer;
use trailcommand::errors::TrailError;
use trailcommand::workers::auth_renewal::{run, Options};

struct ScriptedRenewer {
    results: Mutex<VecDeque<Result<AuthCode, TrailError>>>,
    calls: Mutex<u32>,
}

impl ScriptedRenewer {
    fn new(results: Vec<Result<AuthCode, TrailError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl CodeRenewer for ScriptedRenewer {
    async fn renew(&self) -> Result<AuthCode, TrailError> {
        *self.calls.lock().unwrap() += 1;
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TrailError::AuthError("no more codes".to_string())))
    }
}

fn code(name: &str, now: DateTime<Utc>, expires_in_secs: i64) -> AuthCode {
    AuthCode::new(name, now + chrono::Duration::seconds(expires_in_secs))
}

async fn run_worker(
    policy: LateRenewalPolicy,
    renewer: &ScriptedRenewer,
    initial: AuthCode,
    now: DateTime<Utc>,
) -> (Vec<Duration>, watch::Receiver<Option<AuthCode>>) {
    let sleeps = Mutex::new(Vec::new());
    let (codes_tx, codes_rx) = watch::channel(Some(initial.clone()));

    run(
        &Options { late_renewal: policy },
        renewer,
        initial,
        codes_tx,
        move || now,
        |wait| {
            sleeps.lock().unwrap().push(wait);
            std::future::ready(())
        },
        Box::pin(std::future::pending::<()>()),
    )
    .await;

    (sleeps.into_inner().unwrap(), codes_rx)
}

#[tokio::test]
async fn test_renewal_fires_sixty_seconds_before_expiry() {
    let now = Utc::now();
    // the renewed code lands inside the margin, so the worker stops after one renewal
    let renewer = ScriptedRenewer::new(vec![Ok(code("second", now, 30))]);

    let (sleeps, codes) = run_worker(LateRenewalPolicy::Skip, &renewer, code("first", now, 70), now).await;

    assert_eq!(sleeps, vec![Duration::from_secs(10)]);
    assert_eq!(renewer.calls(), 1);
    assert_eq!(codes.borrow().as_ref().map(|c| c.expose().to_string()), Some("second".to_string()));
}

#[tokio::test]
async fn test_renewal_reschedules_from_new_code() {
    let now = Utc::now();
    let renewer = ScriptedRenewer::new(vec![Ok(code("second", now, 3600)), Ok(code("third", now, 0))]);

    let (sleeps, codes) = run_worker(LateRenewalPolicy::Skip, &renewer, code("first", now, 70), now).await;

    assert_eq!(sleeps, vec![Duration::from_secs(10), Duration::from_secs(3540)]);
    assert_eq!(renewer.calls(), 2);
    assert_eq!(codes.borrow().as_ref().map(|c| c.expose().to_string()), Some("third".to_string()));
}

#[tokio::test]
async fn test_late_code_arms_nothing_with_skip_policy() {
    let now = Utc::now();
    let renewer = ScriptedRenewer::new(vec![]);

    let (sleeps, codes) = run_worker(LateRenewalPolicy::Skip, &renewer, code("first", now, 30), now).await;

    assert!(sleeps.is_empty());
    assert_eq!(renewer.calls(), 0);
    assert_eq!(codes.borrow().as_ref().map(|c| c.expose().to_string()), Some("first".to_string()));
}

#[tokio::test]
async fn test_late_code_renews_once_with_immediate_policy() {
    let now = Utc::now();
    let renewer = ScriptedRenewer::new(vec![Ok(code("second", now, 30))]);

    let (sleeps, _codes) =
        run_worker(LateRenewalPolicy::Immediate, &renewer, code("first", now, 30), now).await;

    assert_eq!(sleeps, vec![Duration::ZERO]);
    assert_eq!(renewer.calls(), 1);
}

#[tokio::test]
async fn test_failed_renewal_keeps_code_and_stops() {
    let now = Utc::now();
    let renewer = ScriptedRenewer::new(vec![Err(TrailError::AuthError("server down".to_string()))]);

    let (sleeps, codes) = run_worker(LateRenewalPolicy::Skip, &renewer, code("first", now, 70), now).await;

    assert_eq!(sleeps.len(), 1);
    assert_eq!(renewer.calls(), 1);
    assert_eq!(codes.borrow().as_ref().map(|c| c.expose().to_string()), Some("first".to_string()));
}

#[tokio::test]
async fn test_shutdown_cancels_pending_renewal() {
    let now = Utc::now();
    let renewer = ScriptedRenewer::new(vec![]);
    let (codes_tx, _codes_rx) = watch::channel(None);

    run(
        &Options::default(),
        &renewer,
        code("first", now, 3600),
        codes_tx,
        move || now,
        |_| std::future::pending::<()>(),
        Box::pin(std::future::ready(())),
    )
    .await;

    assert_eq!(renewer.calls(), 0);
}
