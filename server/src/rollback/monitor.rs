//! Checkpoint monitor
//!
//! One background task per active checkpoint. It polls host health until the
//! operator confirms, the deadline passes, or a probe fails; the losing case
//! triggers the rollback with a human-readable reason. Probes are a trait so
//! the loop is testable without Docker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::rollback::checkpoint::{ChangeType, Checkpoint};
use crate::rollback::store::CheckpointStore;

pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

pub const REASON_TIMEOUT: &str = "timeout";
pub const REASON_CONNECTIVITY: &str = "connectivity lost";
pub const REASON_CONTAINER: &str = "container health check failed";

/// Host health checks consulted between polls.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Whether the named container is running.
    async fn container_running(&self, name: &str) -> bool;

    /// Whether the host still has outbound connectivity. A macvlan
    /// misconfiguration typically shows up here first.
    async fn connectivity_ok(&self) -> bool;
}

/// Probes the real host via the docker CLI and ping.
pub struct DockerHealthProbe {
    /// Targets pinged for the connectivity check; the host counts as
    /// reachable when any one of them answers, so a single dead anycast
    /// address cannot trigger a rollback on its own
    pub probe_targets: Vec<String>,
}

impl Default for DockerHealthProbe {
    fn default() -> Self {
        Self {
            probe_targets: vec![
                "8.8.8.8".to_string(),
                "1.1.1.1".to_string(),
                "google.com".to_string(),
            ],
        }
    }
}

#[async_trait]
impl HealthProbe for DockerHealthProbe {
    async fn container_running(&self, name: &str) -> bool {
        let output = Command::new("docker")
            .args(["inspect", "-f", "{{.State.Running}}", name])
            .output()
            .await;
        matches!(output, Ok(o) if o.status.success()
            && String::from_utf8_lossy(&o.stdout).trim() == "true")
    }

    async fn connectivity_ok(&self) -> bool {
        for target in &self.probe_targets {
            let output = Command::new("ping")
                .args(["-c", "1", "-W", "2", target])
                .output()
                .await;
            if matches!(output, Ok(o) if o.status.success()) {
                return true;
            }
        }
        false
    }
}

/// Spawn the monitor task for a checkpoint and register its cancellation
/// handle with the store. Confirmation and manual rollback cancel it through
/// that handle.
pub async fn spawn_monitor(
    store: Arc<CheckpointStore>,
    probe: Arc<dyn HealthProbe>,
    checkpoint: Checkpoint,
    poll_interval: Duration,
) {
    let (cancel_tx, mut cancel_rx) = watch::channel(());
    store.register_monitor(&checkpoint.id, cancel_tx).await;

    tokio::spawn(async move {
        let id = checkpoint.id.clone();
        debug!(id = %id, "Monitor started");

        loop {
            tokio::select! {
                _ = cancel_rx.changed() => {
                    debug!(id = %id, "Monitor cancelled");
                    return;
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }

            let Some(current) = store.get(&id).await else {
                return;
            };

            if current.is_expired(Utc::now()) {
                info!(id = %id, "Confirmation window elapsed");
                roll_back(&store, &id, REASON_TIMEOUT).await;
                return;
            }

            if let Some(name) = &current.container_name {
                if !probe.container_running(name).await {
                    warn!(id = %id, container = name.as_str(), "Container stopped running");
                    roll_back(&store, &id, REASON_CONTAINER).await;
                    return;
                }
            }

            // Network-level changes are the ones that can cut the host off;
            // a container checkpoint should not roll back on an unrelated
            // connectivity blip.
            if current.change_type != ChangeType::Container && !probe.connectivity_ok().await {
                warn!(id = %id, "Host connectivity lost");
                roll_back(&store, &id, REASON_CONNECTIVITY).await;
                return;
            }
        }
    });
}

async fn roll_back(store: &CheckpointStore, id: &str, reason: &str) {
    if let Err(e) = store.trigger_rollback(id, reason).await {
        // Lost the race with a concurrent confirm; nothing to undo
        debug!(id, reason, error = %e, "Rollback not triggered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rollback::checkpoint::CheckpointStatus;
    use crate::rollback::snapshot::RollbackPlan;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StaticProbe {
        running: AtomicBool,
        connected: AtomicBool,
    }

    impl StaticProbe {
        fn new(running: bool, connected: bool) -> Self {
            Self {
                running: AtomicBool::new(running),
                connected: AtomicBool::new(connected),
            }
        }
    }

    #[async_trait]
    impl HealthProbe for StaticProbe {
        async fn container_running(&self, _name: &str) -> bool {
            self.running.load(Ordering::SeqCst)
        }
        async fn connectivity_ok(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
    }

    async fn store_with_checkpoint(
        change_type: ChangeType,
        timeout_secs: Option<u64>,
    ) -> (tempfile::TempDir, Arc<CheckpointStore>, Checkpoint) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CheckpointStore::new(dir.path()));
        let checkpoint = store
            .create(
                change_type,
                "deploy",
                None,
                RollbackPlan::default(),
                timeout_secs,
            )
            .await
            .unwrap();
        (dir, store, checkpoint)
    }

    #[tokio::test]
    #[cfg(target_os = "linux")]
    async fn test_expired_checkpoint_rolls_back_with_timeout_reason() {
        // Zero-length confirmation window expires before the first poll
        let (_dir, store, checkpoint) =
            store_with_checkpoint(ChangeType::Container, Some(0)).await;
        spawn_monitor(
            store.clone(),
            Arc::new(StaticProbe::new(true, true)),
            checkpoint.clone(),
            Duration::from_millis(10),
        )
        .await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        let after = store.get(&checkpoint.id).await.unwrap();
        assert_eq!(after.status, CheckpointStatus::RolledBack);
        assert_eq!(after.rollback_reason.as_deref(), Some(REASON_TIMEOUT));
    }

    #[tokio::test]
    #[cfg(target_os = "linux")]
    async fn test_connectivity_loss_rolls_back_network_change() {
        // Connectivity is only probed for network-level change types
        let (_dir, store, checkpoint) = store_with_checkpoint(ChangeType::Macvlan, None).await;
        spawn_monitor(
            store.clone(),
            Arc::new(StaticProbe::new(true, false)),
            checkpoint.clone(),
            Duration::from_millis(10),
        )
        .await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        let after = store.get(&checkpoint.id).await.unwrap();
        assert_eq!(after.status, CheckpointStatus::RolledBack);
        assert_eq!(after.rollback_reason.as_deref(), Some(REASON_CONNECTIVITY));
    }

    #[test]
    fn test_default_probe_holds_several_targets() {
        // Reachability is "any target answers"; one target would make a
        // single dead host look like a lost uplink
        let probe = DockerHealthProbe::default();
        assert!(probe.probe_targets.len() >= 2);
    }

    #[tokio::test]
    #[cfg(target_os = "linux")]
    async fn test_confirmation_cancels_monitor() {
        let (_dir, store, checkpoint) = store_with_checkpoint(ChangeType::Container, None).await;
        spawn_monitor(
            store.clone(),
            Arc::new(StaticProbe::new(true, true)),
            checkpoint.clone(),
            Duration::from_millis(10),
        )
        .await;

        store.confirm(&checkpoint.id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let after = store.get(&checkpoint.id).await.unwrap();
        assert_eq!(after.status, CheckpointStatus::Confirmed);
    }
}
