//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Server configuration
    pub server: ServerOptions,

    /// Storage configuration
    pub storage: StorageOptions,

    /// Non-default Docker engine endpoint, passed as `docker -H`
    pub docker_host: Option<String>,

    /// Age at which settled checkpoints are removed
    pub checkpoint_max_age: Duration,

    /// Interval between checkpoint cleanup sweeps
    pub cleanup_interval: Duration,

    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            server: ServerOptions::default(),
            storage: StorageOptions::default(),
            docker_host: None,
            checkpoint_max_age: Duration::from_secs(7 * 24 * 3600),
            cleanup_interval: Duration::from_secs(3600),
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Storage configuration options
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Root directory for generated compose/env artifacts
    pub output_root: PathBuf,

    /// Root directory for checkpoint snapshots
    pub snapshot_root: PathBuf,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("configs"),
            snapshot_root: PathBuf::from("checkpoints"),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}
