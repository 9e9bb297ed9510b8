//! SSH deployment executor
//!
//! Remote hosts are plain Docker boxes reached over SSH; no agent runs
//! there. The generated compose document is translated into a single
//! `docker run` command line and executed through a remote command channel.
//! The channel is a trait so deployment logic is testable without a live
//! SSH endpoint; the default implementation shells out to the ssh client.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::schema::{GuestConfig, NetworkMode};
use crate::deploy::invocation::RunInvocation;
use crate::deploy::local::DEPLOY_TIMEOUT_SECS;
use crate::deploy::DeployReport;
use crate::errors::AppError;
use crate::generate::{compose, network};

const EXEC_TIMEOUT_SECS: u64 = 30;

/// Credentials for a remote Docker host.
#[derive(Debug, Clone)]
pub struct SshCredentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Password auth, forwarded via sshpass
    pub password: Option<SecretString>,
    /// Identity file for key auth
    pub key_path: Option<String>,
}

/// Output of one remote command.
#[derive(Debug, Clone)]
pub struct RemoteOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RemoteOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A channel that runs shell commands on the remote host.
#[async_trait]
pub trait RemoteChannel: Send + Sync {
    async fn exec(&self, command: &str, timeout: Duration) -> Result<RemoteOutput, AppError>;
}

/// Default channel: shells out to the local ssh client.
pub struct SshCliChannel {
    credentials: SshCredentials,
}

impl SshCliChannel {
    pub fn new(credentials: SshCredentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl RemoteChannel for SshCliChannel {
    async fn exec(&self, command: &str, timeout: Duration) -> Result<RemoteOutput, AppError> {
        let creds = &self.credentials;

        let mut cmd;
        if let Some(password) = &creds.password {
            cmd = Command::new("sshpass");
            cmd.arg("-p").arg(password.expose_secret()).arg("ssh");
        } else {
            cmd = Command::new("ssh");
            cmd.arg("-o").arg("BatchMode=yes");
        }

        cmd.arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg("-o")
            .arg("ConnectTimeout=10")
            .arg("-p")
            .arg(creds.port.to_string());
        if let Some(key) = &creds.key_path {
            cmd.arg("-i").arg(key);
        }
        cmd.arg(format!("{}@{}", creds.username, creds.host))
            .arg("--")
            .arg(command)
            .stdin(Stdio::null());

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| AppError::SshTransportError("SSH command timed out".to_string()))?
            .map_err(|e| AppError::SshTransportError(format!("Failed to run ssh: {}", e)))?;

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        // The ssh client reserves 255 for its own failures; anything else is
        // the remote command's exit code.
        if output.status.code() == Some(255) {
            if stderr.contains("Permission denied") || stderr.contains("Authentication") {
                return Err(AppError::SshAuthError(format!(
                    "Authentication to {}@{} failed",
                    creds.username, creds.host
                )));
            }
            return Err(AppError::SshTransportError(format!(
                "SSH connection to {} failed: {}",
                creds.host,
                stderr.trim()
            )));
        }

        Ok(RemoteOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr,
        })
    }
}

/// Executes deployments on a remote Docker host over a command channel.
pub struct SshDockerDeployer {
    channel: Arc<dyn RemoteChannel>,
}

impl SshDockerDeployer {
    pub fn new(credentials: SshCredentials) -> Self {
        Self {
            channel: Arc::new(SshCliChannel::new(credentials)),
        }
    }

    /// Construct over an arbitrary channel.
    pub fn with_channel(channel: Arc<dyn RemoteChannel>) -> Self {
        Self { channel }
    }

    async fn exec(&self, command: &str) -> Result<RemoteOutput, AppError> {
        self.channel
            .exec(command, Duration::from_secs(EXEC_TIMEOUT_SECS))
            .await
    }

    /// Remote environment check; Docker being unreachable is fatal.
    pub async fn preflight(&self) -> Result<(), AppError> {
        let version = self
            .exec("docker version --format '{{.Server.Version}}'")
            .await?;
        if !version.success() {
            return Err(AppError::DeployError(format!(
                "Docker is not reachable on the remote host: {}",
                version.stderr.trim()
            )));
        }
        debug!(version = %version.stdout.trim(), "Remote Docker engine reachable");
        Ok(())
    }

    /// Ensure the external macvlan network exists, creating it from the
    /// configuration when missing.
    async fn ensure_macvlan_network(&self, config: &GuestConfig) -> Result<(), AppError> {
        let name = config
            .macvlan_network_name
            .as_deref()
            .unwrap_or(network::DEFAULT_MACVLAN_NAME);

        let inspect = self
            .exec(&format!("docker network inspect {}", name))
            .await?;
        if inspect.success() {
            return Ok(());
        }

        let script = network::macvlan_setup_script(config).ok_or_else(|| {
            AppError::DeployError(
                "Macvlan network is missing and the configuration lacks the fields to create it"
                    .to_string(),
            )
        })?;

        info!(network = name, "Creating macvlan network on remote host");
        // The script body is a single docker network create command; the
        // shebang and comments are dropped for remote execution.
        let create: String = script
            .lines()
            .filter(|l| !l.starts_with('#') && !l.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        let result = self.exec(&create).await?;
        if !result.success() {
            return Err(AppError::DeployError(format!(
                "Failed to create macvlan network: {}",
                result.stderr.trim()
            )));
        }
        Ok(())
    }

    /// Detach the fresh container from any default bridge leg and make sure
    /// it sits on the macvlan network with its configured address. Both steps
    /// are best-effort: engines differ in whether the run already attached
    /// everything correctly.
    async fn reattach_macvlan(&self, config: &GuestConfig, container: &str) {
        let network_name = config
            .macvlan_network_name
            .as_deref()
            .unwrap_or(network::DEFAULT_MACVLAN_NAME);

        if let Ok(result) = self
            .exec(&format!("docker network disconnect bridge {}", container))
            .await
        {
            if !result.success() {
                debug!(container, "No bridge leg to disconnect");
            }
        }

        let connect = match config.macvlan_ip.as_deref() {
            Some(ip) => format!(
                "docker network connect --ip {} {} {}",
                ip, network_name, container
            ),
            None => format!("docker network connect {} {}", network_name, container),
        };
        if let Ok(result) = self.exec(&connect).await {
            if !result.success() {
                debug!(container, network = network_name, "Container already attached");
            }
        }
    }

    /// Deploy a configuration record to the remote host.
    ///
    /// The compose YAML is re-parsed rather than rebuilt so that an
    /// operator-edited document deploys as edited.
    pub async fn deploy(
        &self,
        config: &GuestConfig,
        compose_yaml: &str,
    ) -> Result<DeployReport, AppError> {
        self.preflight().await?;
        let mut warnings = Vec::new();

        if config.network_mode == NetworkMode::Macvlan {
            self.ensure_macvlan_network(config).await?;
        }

        let file = compose::parse(compose_yaml)?;
        let mut invocation = RunInvocation::from_compose(&file)?;
        let name = invocation.container_name.clone();

        // A device the remote host lacks is dropped from the run, not fatal
        let mut absent = Vec::new();
        for device in invocation.devices() {
            let check = self.exec(&format!("test -e {}", device)).await?;
            if !check.success() {
                absent.push(device);
            }
        }
        for device in &absent {
            warn!(container = %name, device = device.as_str(), "Device missing on remote host");
            warnings.push(format!(
                "{} is not present on the remote host; the guest will run without it",
                device
            ));
        }
        invocation.drop_devices(&absent);

        info!(container = %name, "Starting remote deployment");
        for action in ["stop", "rm"] {
            let result = self.exec(&format!("docker {} {}", action, name)).await?;
            if !result.success() {
                debug!(container = %name, action, "No existing container to clean up");
            }
        }

        let command = invocation.to_shell_command();
        let result = self
            .channel
            .exec(&command, Duration::from_secs(DEPLOY_TIMEOUT_SECS))
            .await
            .map_err(|e| match e {
                AppError::SshTransportError(msg) if msg.contains("timed out") => {
                    AppError::DeployTimeout(DEPLOY_TIMEOUT_SECS)
                }
                other => other,
            })?;

        if !result.success() {
            warn!(container = %name, stderr = %result.stderr.trim(), "Remote docker run failed");
            return Err(AppError::DeployError(format!(
                "Remote docker run failed: {}",
                result.stderr.trim()
            )));
        }

        if config.network_mode == NetworkMode::Macvlan {
            self.reattach_macvlan(config, &name).await;
        }

        info!(container = %name, "Remote deployment complete");
        Ok(DeployReport {
            container_name: name,
            warnings,
            output: result.stdout.trim().to_string(),
        })
    }
}
