//! Winforge - Entry Point
//!
//! Web configuration generator and deployment helper for Windows-in-Docker
//! containers. Serves the HTTP API, generates compose/env artifacts, and
//! babysits risky changes with checkpoints.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::{error, info};

use winforge::app::options::{AppOptions, ServerOptions, StorageOptions};
use winforge::app::run::run;
use winforge::logs::{init_logging, LogLevel, LogOptions};
use winforge::utils::version_info;

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
    if cli_args.contains_key("version") {
        println!("{}", serde_json::to_string_pretty(&version_info()).unwrap());
        return;
    }

    // Initialize logging
    let log_level = cli_args
        .get("log-level")
        .and_then(|raw| LogLevel::from_str(raw).ok())
        .unwrap_or_default();
    let log_options = LogOptions {
        log_level,
        json_format: cli_args.contains_key("log-json"),
        ..Default::default()
    };
    if let Err(e) = init_logging(log_options) {
        println!("Failed to initialize logging: {e}");
    }

    // Assemble options from defaults and CLI overrides
    let defaults = AppOptions::default();
    let options = AppOptions {
        server: ServerOptions {
            host: cli_args
                .get("host")
                .cloned()
                .unwrap_or(defaults.server.host),
            port: cli_args
                .get("port")
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(defaults.server.port),
        },
        storage: StorageOptions {
            output_root: cli_args
                .get("output-dir")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage.output_root),
            snapshot_root: cli_args
                .get("checkpoint-dir")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage.snapshot_root),
        },
        docker_host: cli_args.get("docker-host").cloned(),
        ..defaults
    };

    info!("Running Winforge with options: {:?}", options);
    let result = run(options, await_shutdown_signal()).await;
    if let Err(e) = result {
        error!("Failed to run the server: {e}");
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).unwrap();
        let mut sigint = signal(SignalKind::interrupt()).unwrap();

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
        tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Ctrl+C received, shutting down...");
    }
}
