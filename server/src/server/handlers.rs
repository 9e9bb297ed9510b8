//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::assist::ConfigAnalysis;
use crate::config::schema::{GuestConfig, NetworkMode};
use crate::config::validate::{self, ValidationReport};
use crate::config::versions;
use crate::deploy::ssh::{SshCredentials, SshDockerDeployer};
use crate::deploy::DeployReport;
use crate::errors::AppError;
use crate::generate::files::{self, GeneratedPaths};
use crate::generate::{compose, envfile};
use crate::rollback::checkpoint::{ChangeType, Checkpoint};
use crate::rollback::monitor::{self, POLL_INTERVAL};
use crate::rollback::snapshot::RollbackPlan;
use crate::rollback::store;
use crate::server::state::ServerState;
use crate::utils::version_info;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::ValidationError(_) | AppError::PlatformUnsupported => {
                StatusCode::BAD_REQUEST
            }
            AppError::CheckpointNotFound(_) => StatusCode::NOT_FOUND,
            AppError::CheckpointError(_) => StatusCode::CONFLICT,
            AppError::SshAuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::DeployTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::DeployError(_) | AppError::SshTransportError(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "winforge".to_string(),
        version: version_info().version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

/// Supported Windows version listing
#[derive(Debug, Serialize)]
pub struct VersionEntry {
    pub name: String,
    pub flag: String,
}

pub async fn versions_handler() -> impl IntoResponse {
    let entries: Vec<VersionEntry> = versions::version_map()
        .iter()
        .map(|(name, flag)| VersionEntry {
            name: name.to_string(),
            flag: flag.to_string(),
        })
        .collect();
    Json(entries)
}

/// Validation handler: normalizes and checks a record without generating.
pub async fn validate_handler(Json(mut config): Json<GuestConfig>) -> impl IntoResponse {
    versions::apply_version_mapping(&mut config);
    Json(validate::validate(&config))
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(flatten)]
    pub config: GuestConfig,

    /// Also bring the container up on the local engine
    #[serde(default)]
    pub deploy: bool,
}

/// Checkpoint details attached to a response. Mock checkpoints exist only in
/// the response: non-Linux hosts get the confirmation UX without any
/// monitoring or rollback behind it.
#[derive(Debug, Serialize)]
pub struct CheckpointSummary {
    pub id: String,
    pub timeout_secs: u64,
    pub mock: bool,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub compose: String,
    pub env: String,
    pub paths: GeneratedPaths,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<CheckpointSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeployReport>,
}

/// Generation handler: validate, checkpoint when requested, render both
/// artifacts, write them to disk, and optionally deploy on the local engine.
pub async fn generate_config_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<GenerateRequest>,
) -> Result<Response, AppError> {
    let mut config = request.config;
    versions::apply_version_mapping(&mut config);

    let report = validate::validate(&config);
    if !report.valid {
        return Ok(invalid_config_response(report));
    }

    let checkpoint = if config.enable_rollback {
        Some(create_deploy_checkpoint(&state, &config).await?)
    } else {
        None
    };

    let compose_text = compose::generate(&config)?;
    let env_text = envfile::generate(&config);
    let paths = files::save_config_files(&config, &state.output_root).await?;

    let deployment = if request.deploy {
        Some(state.deployer.deploy(&paths.compose_file).await?)
    } else {
        None
    };

    Ok(Json(GenerateResponse {
        success: true,
        compose: compose_text,
        env: env_text,
        paths,
        warnings: report.warnings,
        checkpoint,
        deployment,
    })
    .into_response())
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub success: bool,
    /// File name -> rendered content
    pub files: std::collections::BTreeMap<String, String>,
    pub warnings: Vec<String>,
}

/// Download handler: renders the artifacts and returns them inline without
/// touching the filesystem.
pub async fn download_config_handler(
    Json(mut config): Json<GuestConfig>,
) -> Result<Response, AppError> {
    versions::apply_version_mapping(&mut config);

    let report = validate::validate(&config);
    if !report.valid {
        return Ok(invalid_config_response(report));
    }

    let name = config.container_name().to_string();
    let mut bundle = std::collections::BTreeMap::new();
    bundle.insert(
        format!("{}-docker-compose.yml", name),
        compose::generate(&config)?,
    );
    bundle.insert(format!("{}.env", name), envfile::generate(&config));
    if let Some(script) = crate::generate::network::macvlan_setup_script(&config) {
        bundle.insert(format!("{}-setup-macvlan.sh", name), script);
    }

    Ok(Json(DownloadResponse {
        success: true,
        files: bundle,
        warnings: report.warnings,
    })
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct SshParams {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
}

fn default_ssh_port() -> u16 {
    22
}

#[derive(Debug, Deserialize)]
pub struct RemoteDeployRequest {
    pub config: GuestConfig,
    pub ssh: SshParams,
}

#[derive(Debug, Serialize)]
pub struct RemoteDeployResponse {
    pub success: bool,
    pub report: DeployReport,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<CheckpointSummary>,
}

/// Remote deployment handler: validate, checkpoint when requested, then
/// translate and execute over SSH.
pub async fn deploy_remote_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<RemoteDeployRequest>,
) -> Result<Response, AppError> {
    let mut config = request.config;
    versions::apply_version_mapping(&mut config);

    let report = validate::validate(&config);
    if !report.valid {
        return Ok(invalid_config_response(report));
    }

    let checkpoint = if config.enable_rollback {
        Some(create_deploy_checkpoint(&state, &config).await?)
    } else {
        None
    };

    let compose_text = compose::generate(&config)?;
    let params = request.ssh;
    let deployer = SshDockerDeployer::new(SshCredentials {
        host: params.host,
        port: params.port,
        username: params.username,
        password: params.password.map(SecretString::from),
        key_path: params.key_path,
    });
    let deploy_report = deployer.deploy(&config, &compose_text).await?;

    Ok(Json(RemoteDeployResponse {
        success: true,
        report: deploy_report,
        warnings: report.warnings,
        checkpoint,
    })
    .into_response())
}

/// Create the checkpoint guarding a deployment. On Linux this is a real
/// snapshot plus monitor; elsewhere a mock summary is synthesized so the
/// flow stays usable in development.
async fn create_deploy_checkpoint(
    state: &ServerState,
    config: &GuestConfig,
) -> Result<CheckpointSummary, AppError> {
    let change_type = if config.network_mode == NetworkMode::Macvlan {
        ChangeType::Macvlan
    } else {
        ChangeType::Container
    };
    let timeout_secs = config.rollback_timeout.map(|minutes| minutes * 60);

    if store::ensure_linux().is_err() {
        return Ok(CheckpointSummary {
            id: format!("mock_{}_{}", change_type.as_str(), Utc::now().timestamp()),
            timeout_secs: timeout_secs.unwrap_or_else(|| change_type.default_timeout()),
            mock: true,
        });
    }

    let name = config.container_name();
    // Artifacts a previous deployment of this name left on disk get backed
    // up before generation overwrites them
    let plan = RollbackPlan {
        remove_container: Some(name.to_string()),
        remove_network: None,
        backup_files: [
            format!("{}-docker-compose.yml", name),
            format!("{}.env", name),
            format!("{}-config.json", name),
        ]
        .iter()
        .map(|file| state.output_root.join(file))
        .collect(),
        backup_network_configs: change_type != ChangeType::Container,
    };
    let checkpoint = state
        .checkpoints
        .create(
            change_type,
            format!("Deploy {}", config.container_name()),
            Some(config),
            plan,
            timeout_secs,
        )
        .await?;

    monitor::spawn_monitor(
        state.checkpoints.clone(),
        state.probe.clone(),
        checkpoint.clone(),
        POLL_INTERVAL,
    )
    .await;

    Ok(CheckpointSummary {
        id: checkpoint.id,
        timeout_secs: checkpoint.timeout_secs,
        mock: false,
    })
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub checkpoint_id: String,
}

pub async fn confirm_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<ConfirmRequest>,
) -> Result<Json<Checkpoint>, AppError> {
    Ok(Json(state.checkpoints.confirm(&request.checkpoint_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub checkpoint_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn trigger_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<TriggerRequest>,
) -> Result<Json<Checkpoint>, AppError> {
    let reason = request
        .reason
        .unwrap_or_else(|| "manual rollback requested".to_string());
    Ok(Json(
        state
            .checkpoints
            .trigger_rollback(&request.checkpoint_id, &reason)
            .await?,
    ))
}

#[derive(Debug, Serialize)]
pub struct CheckpointStatusResponse {
    #[serde(flatten)]
    pub checkpoint: Checkpoint,
    pub seconds_remaining: u64,
}

pub async fn checkpoint_status_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<CheckpointStatusResponse>, AppError> {
    let checkpoint = state
        .checkpoints
        .get(&id)
        .await
        .ok_or(AppError::CheckpointNotFound(id))?;
    let seconds_remaining = checkpoint.seconds_remaining(Utc::now());
    Ok(Json(CheckpointStatusResponse {
        checkpoint,
        seconds_remaining,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    /// Limit to checkpoints created within the last N days
    #[serde(default)]
    pub days: Option<i64>,
}

pub async fn history_handler(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<HistoryParams>,
) -> Json<Vec<Checkpoint>> {
    let mut history = state.checkpoints.history().await;
    if let Some(days) = params.days {
        let cutoff = Utc::now() - Duration::days(days);
        history.retain(|c| c.created_at >= cutoff);
    }
    Json(history)
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub available: bool,
}

pub async fn chat_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<ChatRequest>,
) -> Json<ChatResponse> {
    let reply = state
        .assistant
        .chat(&request.message, request.context.as_deref())
        .await;
    Json(ChatResponse {
        reply,
        available: state.assistant.is_available(),
    })
}

pub async fn analyze_config_handler(
    State(state): State<Arc<ServerState>>,
    Json(mut config): Json<GuestConfig>,
) -> Json<ConfigAnalysis> {
    versions::apply_version_mapping(&mut config);
    Json(state.assistant.analyze_config(&config).await)
}

#[derive(Debug, Deserialize)]
pub struct TroubleshootRequest {
    pub issue: String,
    #[serde(default)]
    pub logs: Option<String>,
}

pub async fn troubleshoot_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<TroubleshootRequest>,
) -> Json<ChatResponse> {
    let reply = state
        .assistant
        .troubleshoot(&request.issue, request.logs.as_deref())
        .await;
    Json(ChatResponse {
        reply,
        available: state.assistant.is_available(),
    })
}

fn invalid_config_response(report: ValidationReport) -> Response {
    (StatusCode::BAD_REQUEST, Json(report)).into_response()
}
