//! TrailCommand dashboard session - Entry Point
//!
//! Headless dashboard: signs in, selects one device, keeps its widgets in
//! sync through polling and push notifications, or runs a one-shot device
//! command.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{error, info};
use trail_api::models::LoginRequest;

use trailcommand::app::dash::run;
use trailcommand::app::options::DashOptions;
use trailcommand::dashboard::session::DashboardSession;
use trailcommand::http::client::HttpClient;
use trailcommand::logs::{init_logging, LogFormat, LogOptions};
use trailcommand::storage::settings::DashSettings;
use trailcommand::utils::{redact, version_info};

const DEFAULT_SETTINGS_PATH: &str = "dash-settings.json";

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to print version: {e}"),
        }
        return;
    }

    if let Err(e) = run_cli(cli_args).await {
        error!("trail-dash failed: {e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run_cli(cli_args: HashMap<String, String>) -> anyhow::Result<()> {
    let settings_path = cli_args
        .get("settings")
        .cloned()
        .or_else(|| env::var("TRAIL_DASH_SETTINGS").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH));

    let mut settings = DashSettings::load(&settings_path)
        .await
        .with_context(|| format!("reading settings from {}", settings_path.display()))?;
    settings.apply_process_env();

    let _log_guard = init_logging(LogOptions {
        log_level: settings.log_level.clone(),
        format: LogFormat::Plain,
        ..Default::default()
    })
    .context("initializing logging")?;

    let http_client = Arc::new(HttpClient::new(&settings.server.http_origin())?);
    let session = Arc::new(DashboardSession::new(http_client.clone()));

    let token = match settings.auth_token.clone() {
        Some(token) => token,
        None => login(&http_client).await?,
    };
    info!(token = %redact(token.expose_secret()), "Signed in");
    session.set_token(token);

    let device_id = cli_args
        .get("device")
        .cloned()
        .ok_or_else(|| anyhow!("--device=<id> is required"))?;
    session
        .select_device(&device_id, None)
        .await
        .with_context(|| format!("loading device {}", device_id))?;

    // One-shot commands
    if let Some(assignment) = cli_args.get("set") {
        let (control_id, raw) = assignment
            .split_once(':')
            .ok_or_else(|| anyhow!("--set expects <control_id>:<value>"))?;
        let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        let widget = session
            .widgets()
            .await
            .into_iter()
            .find(|w| w.control_id() == Some(control_id))
            .ok_or_else(|| anyhow!("no widget bound to control {}", control_id))?;
        session.send_control_command(&widget.id, value.clone()).await?;
        println!("{} <- {}", control_id, value);
        return Ok(());
    }
    if let Some(confirmation) = cli_args.get("delete") {
        session.delete_device(&device_id, confirmation).await?;
        println!("Deleted device {}", device_id);
        return Ok(());
    }
    if cli_args.contains_key("generate-auth") {
        let response = session.generate_auth(&device_id).await?;
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }
    if cli_args.contains_key("revoke-auth") {
        session.revoke_auth(&device_id).await?;
        println!("Revoked auth for device {}", device_id);
        return Ok(());
    }

    let options = DashOptions::from_settings(&settings);
    info!("Running dashboard session with options: {:?}", options);
    run(session, options, await_shutdown_signal()).await?;
    Ok(())
}

async fn login(http_client: &HttpClient) -> anyhow::Result<SecretString> {
    let email = env::var("TRAIL_EMAIL").context("AUTH_TOKEN or TRAIL_EMAIL must be set")?;
    let password = env::var("TRAIL_PASSWORD").context("TRAIL_PASSWORD must be set")?;

    let response = http_client
        .login(&LoginRequest {
            email: Some(email),
            username: None,
            password,
        })
        .await
        .context("logging in")?;
    if response.token.is_empty() {
        bail!("login response carried no token");
    }
    Ok(SecretString::from(response.token))
}

async fn await_shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {e}");
    }
    info!("Ctrl+C received, shutting down...");
}
