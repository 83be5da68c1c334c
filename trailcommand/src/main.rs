//! TrailCommand edge agent - Entry Point
//!
//! Exposes the device's sensors and controls to the TrailCommand server:
//! enrolls the device, keeps its auth code fresh, streams sensor readings
//! and applies control commands to GPIO.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use colored::Colorize;
use tracing::{error, info, info_span, Instrument};

use trailcommand::app::options::AgentOptions;
use trailcommand::app::run::run;
use trailcommand::app::state::RuntimeContext;
use trailcommand::hardware::gpio::{probe, GpioMode};
use trailcommand::logs::{init_logging, LogOptions};
use trailcommand::storage::config::EdgeConfig;
use trailcommand::utils::version_info;

const DEFAULT_CONFIG_PATH: &str = "config.json";

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to print version: {e}"),
        }
        return;
    }

    let config_path = cli_args
        .get("config")
        .cloned()
        .or_else(|| env::var("TRAILCOMMAND_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    // Run diagnostics
    if cli_args.contains_key("diagnostic") || cli_args.contains_key("diag") {
        run_diagnostic(&config_path).await;
        return;
    }

    let (config, load_error) = EdgeConfig::load_or_default(&config_path).await;

    // Initialize logging
    let log_options = LogOptions {
        log_level: config.settings.log_level.clone(),
        format: config.settings.log_format,
        log_dir: config.settings.log_dir.clone(),
        file_prefix: "trail-agent.log".to_string(),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    match load_error {
        Some(e) => error!(path = %config_path.display(), error = %e, "Failed to load config file, using defaults"),
        None => info!(path = %config_path.display(), "Loaded configuration"),
    }

    let span = info_span!("trail-agent", device_id = %config.device.id);
    let result = async move {
        info!(version = %version.version, "Starting TrailCommand edge agent");
        let options = AgentOptions::from_config(&config);
        let context = RuntimeContext::init(config).await?;
        info!("Running edge agent with options: {:?}", options);
        run(context, options, await_shutdown_signal()).await
    }
    .instrument(span)
    .await;

    if let Err(e) = result {
        error!("Edge agent failed: {e}");
        std::process::exit(1);
    }
}

async fn run_diagnostic(config_path: &std::path::Path) {
    println!("{}", "TrailCommand edge agent diagnostic".bold());

    let config = match EdgeConfig::load(config_path).await {
        Ok(config) => {
            println!("{} config loaded from {}", "ok".green(), config_path.display());
            config
        }
        Err(e) => {
            println!("{} config at {}: {} (defaults apply)", "warn".yellow(), config_path.display(), e);
            EdgeConfig::default()
        }
    };

    println!("  server:   {}", config.server.http_origin());
    println!("  device:   {} ({})", config.device.id, config.device.name);
    println!("  sensors:  {}", config.enabled_sensors().join(", "));
    println!("  controls: {}", config.enabled_controls().join(", "));

    let gpio = probe(config.settings.gpio_timeout()).await;
    match gpio.mode() {
        GpioMode::Hardware => println!("{} GPIO hardware available", "ok".green()),
        GpioMode::Simulation => println!("{} GPIO unavailable, simulation mode", "warn".yellow()),
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                (Err(e), _) | (_, Err(e)) => {
                    error!("Failed to install signal handlers: {e}");
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Ctrl+C received, shutting down...");
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
        }
        info!("Ctrl+C received, shutting down...");
    }
}
