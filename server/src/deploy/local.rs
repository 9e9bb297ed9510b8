//! Direct deployment against a local Docker endpoint

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::deploy::invocation::RunInvocation;
use crate::deploy::DeployReport;
use crate::errors::AppError;
use crate::generate::compose;

/// Hard ceiling on a single deployment; first boot pulls a multi-gigabyte
/// image, anything past this is stuck.
pub const DEPLOY_TIMEOUT_SECS: u64 = 300;

const COMMAND_TIMEOUT_SECS: u64 = 30;

/// Executes deployments by shelling out to the docker CLI on this host.
#[derive(Debug, Clone, Default)]
pub struct DirectDockerDeployer {
    /// Non-default engine endpoint, passed as `docker -H`
    docker_host: Option<String>,
}

impl DirectDockerDeployer {
    pub fn new(docker_host: Option<String>) -> Self {
        Self { docker_host }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("docker");
        if let Some(host) = &self.docker_host {
            cmd.arg("-H").arg(host);
        }
        cmd
    }

    /// Engine reachability check; fatal when the daemon does not answer.
    pub async fn preflight(&self) -> Result<(), AppError> {
        let output = run_bounded(self.command().arg("version").arg("--format").arg("{{.Server.Version}}"))
            .await
            .map_err(|e| AppError::DeployError(format!("Docker engine is not reachable: {}", e)))?;
        if !output.status.success() {
            return Err(AppError::DeployError(
                "Docker engine is not reachable".to_string(),
            ));
        }
        debug!(
            version = %String::from_utf8_lossy(&output.stdout).trim(),
            "Docker engine reachable"
        );
        Ok(())
    }

    /// Deploy a generated compose file.
    ///
    /// The document is parsed back into structure and translated into a
    /// single `docker run`, so an operator-edited file deploys as edited.
    /// Declared devices absent on this host are dropped with a warning; any
    /// container with the same name is stopped and removed first, best-effort
    /// since it may simply not exist.
    pub async fn deploy(&self, compose_file: &Path) -> Result<DeployReport, AppError> {
        self.preflight().await?;

        let text = tokio::fs::read_to_string(compose_file).await?;
        let file = compose::parse(&text)?;
        let mut invocation = RunInvocation::from_compose(&file)?;
        let name = invocation.container_name.clone();

        let mut warnings = Vec::new();
        let mut absent = Vec::new();
        for device in invocation.devices() {
            if tokio::fs::metadata(&device).await.is_err() {
                absent.push(device);
            }
        }
        for device in &absent {
            warn!(container = %name, device = device.as_str(), "Device missing on this host");
            warnings.push(format!(
                "{} is not present on this host; the guest will run without it",
                device
            ));
        }
        invocation.drop_devices(&absent);

        info!(container = %name, "Starting local deployment");
        self.remove_container(&name).await;

        let mut cmd = self.command();
        cmd.args(&invocation.args);

        let output = tokio::time::timeout(
            Duration::from_secs(DEPLOY_TIMEOUT_SECS),
            cmd.output(),
        )
        .await
        .map_err(|_| AppError::DeployTimeout(DEPLOY_TIMEOUT_SECS))?
        .map_err(|e| AppError::DeployError(format!("Failed to run docker: {}", e)))?;

        if !output.status.success() {
            return Err(AppError::DeployError(format!(
                "docker run failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        // docker run -d prints the engine-assigned container id
        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!(container = %name, id = %container_id, "Local deployment complete");
        Ok(DeployReport {
            container_name: name,
            warnings,
            output: container_id,
        })
    }

    /// Stop and remove a container if it exists.
    pub async fn remove_container(&self, name: &str) {
        for action in ["stop", "rm"] {
            match run_bounded(self.command().arg(action).arg(name)).await {
                Ok(output) if !output.status.success() => {
                    debug!(container = name, action, "No existing container to clean up");
                }
                Ok(_) => {}
                Err(e) => warn!(container = name, action, error = %e, "Cleanup command failed"),
            }
        }
    }

    /// One-line status for a named container, `None` when absent.
    pub async fn container_status(&self, name: &str) -> Result<Option<String>, AppError> {
        let output = run_bounded(
            self.command()
                .arg("ps")
                .arg("-a")
                .arg("--filter")
                .arg(format!("name=^{}$", name))
                .arg("--format")
                .arg("{{.Status}}"),
        )
        .await
        .map_err(|e| AppError::DeployError(format!("Failed to run docker ps: {}", e)))?;

        if !output.status.success() {
            return Err(AppError::DeployError(format!(
                "docker ps failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let status = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(if status.is_empty() { None } else { Some(status) })
    }
}

async fn run_bounded(cmd: &mut Command) -> std::io::Result<std::process::Output> {
    tokio::time::timeout(Duration::from_secs(COMMAND_TIMEOUT_SECS), cmd.output())
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "command timed out"))?
}
