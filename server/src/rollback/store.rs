//! Checkpoint store
//!
//! In-memory index over the on-disk snapshot directories. The map is the
//! source of truth while the server runs; `load_from_disk` rebuilds it after
//! a restart so unconfirmed checkpoints are not silently forgotten.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{Duration, Utc};
use tokio::sync::{watch, RwLock};
use tracing::{info, warn};

use crate::config::schema::GuestConfig;
use crate::errors::AppError;
use crate::rollback::checkpoint::{ChangeType, Checkpoint, CheckpointStatus};
use crate::rollback::snapshot::{self, RollbackPlan};

pub struct CheckpointStore {
    root: PathBuf,
    checkpoints: RwLock<HashMap<String, Checkpoint>>,
    monitors: RwLock<HashMap<String, watch::Sender<()>>>,
}

impl CheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            checkpoints: RwLock::new(HashMap::new()),
            monitors: RwLock::new(HashMap::new()),
        }
    }

    pub fn snapshot_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Create a checkpoint with a full snapshot. A snapshot that cannot be
    /// written means the change cannot be undone, so creation fails rather
    /// than handing out a checkpoint that only pretends to protect.
    pub async fn create(
        &self,
        change_type: ChangeType,
        description: impl Into<String>,
        config: Option<&GuestConfig>,
        plan: RollbackPlan,
        timeout_secs: Option<u64>,
    ) -> Result<Checkpoint, AppError> {
        ensure_linux()?;

        let container_name = plan.remove_container.clone();
        let mut checkpoint = Checkpoint::new(change_type, description, container_name);
        if let Some(timeout) = timeout_secs {
            checkpoint.timeout_secs = timeout;
        }
        let dir = self.snapshot_dir(&checkpoint.id);

        if let Err(e) = snapshot::capture(&dir, &checkpoint, config, &plan).await {
            let _ = tokio::fs::remove_dir_all(&dir).await;
            return Err(AppError::CheckpointError(format!(
                "Snapshot capture failed: {}",
                e
            )));
        }

        info!(
            id = %checkpoint.id,
            change_type = change_type.as_str(),
            timeout_secs = checkpoint.timeout_secs,
            "Checkpoint created"
        );
        self.checkpoints
            .write()
            .await
            .insert(checkpoint.id.clone(), checkpoint.clone());
        Ok(checkpoint)
    }

    pub async fn get(&self, id: &str) -> Option<Checkpoint> {
        self.checkpoints.read().await.get(id).cloned()
    }

    /// Confirm a change: the monitor is cancelled and the checkpoint kept
    /// for history. Idempotent; confirming twice returns the same settled
    /// checkpoint. A rolled-back change can no longer be confirmed.
    pub async fn confirm(&self, id: &str) -> Result<Checkpoint, AppError> {
        let mut map = self.checkpoints.write().await;
        let checkpoint = map
            .get_mut(id)
            .ok_or_else(|| AppError::CheckpointNotFound(id.to_string()))?;

        match checkpoint.status {
            CheckpointStatus::Active => {}
            CheckpointStatus::Confirmed => return Ok(checkpoint.clone()),
            CheckpointStatus::RolledBack | CheckpointStatus::Failed => {
                return Err(AppError::CheckpointError(format!(
                    "Checkpoint {} was already rolled back",
                    id
                )))
            }
        }

        checkpoint.status = CheckpointStatus::Confirmed;
        checkpoint.confirmed_at = Some(Utc::now());
        let updated = checkpoint.clone();
        drop(map);

        self.cancel_monitor(id).await;
        if let Err(e) = snapshot::update_metadata(&self.snapshot_dir(id), &updated).await {
            warn!(id, error = %e, "Failed to persist confirmed checkpoint");
        }
        info!(id, "Checkpoint confirmed");
        Ok(updated)
    }

    /// Roll the change back. Restore is best-effort; partial failures mark
    /// the checkpoint failed but never resurrect the change.
    pub async fn trigger_rollback(&self, id: &str, reason: &str) -> Result<Checkpoint, AppError> {
        {
            let map = self.checkpoints.read().await;
            let checkpoint = map
                .get(id)
                .ok_or_else(|| AppError::CheckpointNotFound(id.to_string()))?;
            if checkpoint.status != CheckpointStatus::Active {
                return Err(AppError::CheckpointError(format!(
                    "Checkpoint {} is not active",
                    id
                )));
            }
        }

        info!(id, reason, "Rolling back checkpoint");
        let failures = snapshot::restore(&self.snapshot_dir(id)).await;
        for failure in &failures {
            warn!(id, failure = failure.as_str(), "Rollback step failed");
        }

        let mut map = self.checkpoints.write().await;
        let checkpoint = map
            .get_mut(id)
            .ok_or_else(|| AppError::CheckpointNotFound(id.to_string()))?;
        checkpoint.status = if failures.is_empty() {
            CheckpointStatus::RolledBack
        } else {
            CheckpointStatus::Failed
        };
        checkpoint.rolled_back_at = Some(Utc::now());
        checkpoint.rollback_reason = Some(reason.to_string());
        let updated = checkpoint.clone();
        drop(map);

        self.cancel_monitor(id).await;
        if let Err(e) = snapshot::update_metadata(&self.snapshot_dir(id), &updated).await {
            warn!(id, error = %e, "Failed to persist rolled-back checkpoint");
        }
        Ok(updated)
    }

    /// All known checkpoints, newest first.
    pub async fn history(&self) -> Vec<Checkpoint> {
        let mut all: Vec<Checkpoint> = self.checkpoints.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    /// Active checkpoints only.
    pub async fn active(&self) -> Vec<Checkpoint> {
        self.history()
            .await
            .into_iter()
            .filter(|c| c.status == CheckpointStatus::Active)
            .collect()
    }

    /// Drop settled checkpoints older than `max_age`, snapshots included.
    /// Active checkpoints are never cleaned up.
    pub async fn cleanup_old(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let stale: Vec<String> = self
            .checkpoints
            .read()
            .await
            .values()
            .filter(|c| c.status != CheckpointStatus::Active && c.created_at < cutoff)
            .map(|c| c.id.clone())
            .collect();

        let mut removed = 0;
        for id in stale {
            if let Err(e) = tokio::fs::remove_dir_all(self.snapshot_dir(&id)).await {
                warn!(id = id.as_str(), error = %e, "Failed to remove stale snapshot");
                continue;
            }
            self.checkpoints.write().await.remove(&id);
            removed += 1;
        }
        if removed > 0 {
            info!(removed, "Cleaned up stale checkpoints");
        }
        removed
    }

    /// Rebuild the index from snapshot directories on disk.
    pub async fn load_from_disk(&self) -> Result<usize, AppError> {
        if tokio::fs::metadata(&self.root).await.is_err() {
            return Ok(0);
        }

        let mut loaded = 0;
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            match snapshot::read_metadata(&entry.path()).await {
                Ok(checkpoint) => {
                    self.checkpoints
                        .write()
                        .await
                        .insert(checkpoint.id.clone(), checkpoint);
                    loaded += 1;
                }
                Err(e) => {
                    warn!(dir = %entry.path().display(), error = %e, "Skipping unreadable snapshot")
                }
            }
        }
        info!(loaded, "Loaded checkpoints from disk");
        Ok(loaded)
    }

    /// Register the cancellation handle of a running monitor.
    pub async fn register_monitor(&self, id: &str, cancel: watch::Sender<()>) {
        self.monitors.write().await.insert(id.to_string(), cancel);
    }

    async fn cancel_monitor(&self, id: &str) {
        if let Some(cancel) = self.monitors.write().await.remove(id) {
            let _ = cancel.send(());
        }
    }
}

/// Rollback manipulates host networking and the Docker engine in ways that
/// only hold together on a Linux host.
pub fn ensure_linux() -> Result<(), AppError> {
    if cfg!(target_os = "linux") {
        Ok(())
    } else {
        Err(AppError::PlatformUnsupported)
    }
}
