//! Checkpoint snapshots
//!
//! A snapshot directory captures enough host state to undo one change and to
//! debug a rollback after the fact. Capture failures abort checkpoint
//! creation; restore is best-effort and reports what it could not undo.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::schema::GuestConfig;
use crate::errors::AppError;
use crate::rollback::checkpoint::Checkpoint;

const COMMAND_TIMEOUT_SECS: u64 = 30;

pub const METADATA_FILE: &str = "metadata.json";
pub const CONFIG_FILE: &str = "config.json";
pub const DOCKER_STATE_FILE: &str = "docker_state.json";
pub const NETWORK_STATE_FILE: &str = "network_state.json";
pub const ROLLBACK_INFO_FILE: &str = "rollback_info.json";
pub const FILES_DIR: &str = "files";
pub const FILE_MANIFEST: &str = "files.json";

/// Host network configuration backed up alongside the Docker state. Restoring
/// these undoes interface edits a failed network change left behind.
const NETWORK_CONFIG_PATHS: &[&str] = &["/etc/network/interfaces", "/etc/netplan"];

/// What to undo when the checkpoint rolls back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollbackPlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_container: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_network: Option<String>,

    /// Files to copy into the snapshot and write back on rollback; entries
    /// that do not exist at capture time are skipped
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backup_files: Vec<PathBuf>,

    /// Also back up the host's network configuration files. Set for
    /// network-level changes; container changes never touch /etc.
    #[serde(default)]
    pub backup_network_configs: bool,
}

/// One backed-up file: where the copy lives inside the snapshot's `files/`
/// directory and where it goes back on restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BackupEntry {
    backup: String,
    original: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockerState {
    pub containers: String,
    pub networks: String,
    #[serde(default)]
    pub volumes: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkState {
    pub addresses: String,
    pub routes: String,
    #[serde(default)]
    pub firewall_rules: String,
}

/// Capture a full snapshot into `dir`. Any write failure propagates; the
/// caller is expected to discard the partial directory.
pub async fn capture(
    dir: &Path,
    checkpoint: &Checkpoint,
    config: Option<&GuestConfig>,
    plan: &RollbackPlan,
) -> Result<(), AppError> {
    tokio::fs::create_dir_all(dir).await?;

    write_json(dir.join(METADATA_FILE), checkpoint).await?;
    if let Some(config) = config {
        write_json(dir.join(CONFIG_FILE), config).await?;
    }
    write_json(dir.join(ROLLBACK_INFO_FILE), plan).await?;

    let docker_state = DockerState {
        containers: command_output("docker", &["ps", "-a", "--format", "{{json .}}"]).await,
        networks: command_output("docker", &["network", "ls", "--format", "{{json .}}"]).await,
        volumes: command_output("docker", &["volume", "ls", "--format", "{{json .}}"]).await,
    };
    write_json(dir.join(DOCKER_STATE_FILE), &docker_state).await?;

    let network_state = NetworkState {
        addresses: command_output("ip", &["-j", "addr", "show"]).await,
        routes: command_output("ip", &["-j", "route", "show"]).await,
        firewall_rules: command_output("iptables-save", &[]).await,
    };
    write_json(dir.join(NETWORK_STATE_FILE), &network_state).await?;

    backup_files(dir, plan).await?;

    debug!(dir = %dir.display(), "Snapshot captured");
    Ok(())
}

/// Copy the plan's files plus the host's network configuration into the
/// snapshot. Sources that do not exist are skipped; a copy that fails
/// propagates, since a snapshot missing a promised backup cannot restore.
async fn backup_files(dir: &Path, plan: &RollbackPlan) -> Result<(), AppError> {
    let files_dir = dir.join(FILES_DIR);
    tokio::fs::create_dir_all(&files_dir).await?;

    let mut manifest = Vec::new();
    for original in &plan.backup_files {
        if let Some(entry) = copy_into(&files_dir, manifest.len(), original).await? {
            manifest.push(entry);
        }
    }
    if plan.backup_network_configs {
        for original in network_config_files().await {
            // An unreadable host config is skipped rather than failing the
            // whole snapshot
            match copy_into(&files_dir, manifest.len(), &original).await {
                Ok(Some(entry)) => manifest.push(entry),
                Ok(None) => {}
                Err(e) => {
                    warn!(file = %original.display(), error = %e, "Skipping unreadable network config")
                }
            }
        }
    }

    debug!(dir = %dir.display(), files = manifest.len(), "Backed up configuration files");
    write_json(dir.join(FILE_MANIFEST), &manifest).await
}

async fn copy_into(
    files_dir: &Path,
    index: usize,
    original: &Path,
) -> Result<Option<BackupEntry>, AppError> {
    match tokio::fs::metadata(original).await {
        Ok(meta) if meta.is_file() => {}
        _ => return Ok(None),
    }
    let file_name = original
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let backup = format!("{}_{}", index, file_name);
    tokio::fs::copy(original, files_dir.join(&backup)).await?;
    Ok(Some(BackupEntry {
        backup,
        original: original.to_path_buf(),
    }))
}

/// Host network configuration files worth snapshotting, resolved to the
/// individual files that actually exist.
async fn network_config_files() -> Vec<PathBuf> {
    let mut files = Vec::new();
    for candidate in NETWORK_CONFIG_PATHS {
        let path = PathBuf::from(candidate);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => {
                if let Ok(mut entries) = tokio::fs::read_dir(&path).await {
                    while let Ok(Some(entry)) = entries.next_entry().await {
                        if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                            files.push(entry.path());
                        }
                    }
                }
            }
            Ok(_) => files.push(path),
            Err(_) => {}
        }
    }
    files
}

/// Persist updated checkpoint metadata into an existing snapshot directory.
pub async fn update_metadata(dir: &Path, checkpoint: &Checkpoint) -> Result<(), AppError> {
    write_json(dir.join(METADATA_FILE), checkpoint).await
}

/// Read checkpoint metadata back from a snapshot directory.
pub async fn read_metadata(dir: &Path) -> Result<Checkpoint, AppError> {
    let raw = tokio::fs::read_to_string(dir.join(METADATA_FILE)).await?;
    Ok(serde_json::from_str(&raw)?)
}

/// Execute the rollback plan recorded in `dir`. Each step that fails is
/// reported rather than aborting the rest; a partial undo is still better
/// than none.
pub async fn restore(dir: &Path) -> Vec<String> {
    let mut failures = Vec::new();

    let plan: RollbackPlan = match tokio::fs::read_to_string(dir.join(ROLLBACK_INFO_FILE)).await {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(plan) => plan,
            Err(e) => {
                failures.push(format!("Unreadable rollback plan: {}", e));
                return failures;
            }
        },
        Err(e) => {
            failures.push(format!("Missing rollback plan: {}", e));
            return failures;
        }
    };

    if let Some(container) = &plan.remove_container {
        if !run_ok("docker", &["stop", container]).await {
            failures.push(format!("Failed to stop container {}", container));
        }
        if !run_ok("docker", &["rm", container]).await {
            failures.push(format!("Failed to remove container {}", container));
        }
    }

    if let Some(network) = &plan.remove_network {
        if !run_ok("docker", &["network", "rm", network]).await {
            failures.push(format!("Failed to remove network {}", network));
        }
    }

    // Write backed-up configuration files over whatever the change left behind
    if let Ok(raw) = tokio::fs::read_to_string(dir.join(FILE_MANIFEST)).await {
        let manifest: Vec<BackupEntry> = match serde_json::from_str(&raw) {
            Ok(manifest) => manifest,
            Err(e) => {
                failures.push(format!("Unreadable backup manifest: {}", e));
                return failures;
            }
        };
        for entry in &manifest {
            let source = dir.join(FILES_DIR).join(&entry.backup);
            if let Err(e) = tokio::fs::copy(&source, &entry.original).await {
                failures.push(format!(
                    "Failed to restore {}: {}",
                    entry.original.display(),
                    e
                ));
            }
        }
    }

    failures
}

async fn write_json<T: Serialize>(path: std::path::PathBuf, value: &T) -> Result<(), AppError> {
    let body = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, body).await?;
    Ok(())
}

/// Run a state-capture command, returning empty output when the tool is
/// unavailable. A host without `ip` still gets a usable snapshot.
async fn command_output(program: &str, args: &[&str]) -> String {
    let result = tokio::time::timeout(
        Duration::from_secs(COMMAND_TIMEOUT_SECS),
        Command::new(program).args(args).output(),
    )
    .await;

    match result {
        Ok(Ok(output)) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).to_string()
        }
        Ok(Ok(output)) => {
            debug!(program, status = ?output.status.code(), "Capture command failed");
            String::new()
        }
        Ok(Err(e)) => {
            warn!(program, error = %e, "Capture command unavailable");
            String::new()
        }
        Err(_) => {
            warn!(program, "Capture command timed out");
            String::new()
        }
    }
}

async fn run_ok(program: &str, args: &[&str]) -> bool {
    let result = tokio::time::timeout(
        Duration::from_secs(COMMAND_TIMEOUT_SECS),
        Command::new(program).args(args).output(),
    )
    .await;
    matches!(result, Ok(Ok(output)) if output.status.success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rollback::checkpoint::ChangeType;

    #[tokio::test]
    async fn test_capture_writes_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let cp = Checkpoint::new(ChangeType::Container, "deploy win11-test", None);
        let plan = RollbackPlan {
            remove_container: Some("win11-test".to_string()),
            ..Default::default()
        };

        capture(dir.path(), &cp, None, &plan).await.unwrap();

        for file in [
            METADATA_FILE,
            DOCKER_STATE_FILE,
            NETWORK_STATE_FILE,
            ROLLBACK_INFO_FILE,
            FILE_MANIFEST,
        ] {
            assert!(dir.path().join(file).exists(), "missing {}", file);
        }

        let restored = read_metadata(dir.path()).await.unwrap();
        assert_eq!(restored.id, cp.id);
        assert_eq!(restored.change_type, ChangeType::Container);
    }

    #[tokio::test]
    async fn test_backed_up_files_restored_on_rollback() {
        let snapshot = tempfile::tempdir().unwrap();
        let configs = tempfile::tempdir().unwrap();
        let compose_path = configs.path().join("win11-test-docker-compose.yml");
        tokio::fs::write(&compose_path, "services: {}\n").await.unwrap();

        let cp = Checkpoint::new(ChangeType::Container, "redeploy win11-test", None);
        let plan = RollbackPlan {
            backup_files: vec![
                compose_path.clone(),
                // Nonexistent entries are skipped, not fatal
                configs.path().join("win11-test.env"),
            ],
            ..Default::default()
        };
        capture(snapshot.path(), &cp, None, &plan).await.unwrap();

        // The change overwrites the file; rollback brings the copy back
        tokio::fs::write(&compose_path, "services:\n  broken: {}\n")
            .await
            .unwrap();
        let failures = restore(snapshot.path()).await;
        assert!(failures.is_empty(), "failures: {:?}", failures);

        let restored = tokio::fs::read_to_string(&compose_path).await.unwrap();
        assert_eq!(restored, "services: {}\n");
    }

    #[tokio::test]
    async fn test_restore_without_plan_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let failures = restore(dir.path()).await;
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("Missing rollback plan"));
    }
}
