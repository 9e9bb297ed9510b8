//! Error types for the Winforge server

use thiserror::Error;

/// Main error type for the Winforge server
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Generation error: {0}")]
    GenerationError(String),

    #[error("Deployment error: {0}")]
    DeployError(String),

    #[error("Deployment timed out after {0} seconds")]
    DeployTimeout(u64),

    #[error("SSH authentication failed: {0}")]
    SshAuthError(String),

    #[error("SSH connection failed: {0}")]
    SshTransportError(String),

    #[error("Checkpoint error: {0}")]
    CheckpointError(String),

    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("Rollback is only available on Linux hosts")]
    PlatformUnsupported,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
