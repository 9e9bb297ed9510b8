//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::app::options::AppOptions;
use crate::assist::{Assistant, AssistantConfig};
use crate::deploy::local::DirectDockerDeployer;
use crate::errors::AppError;
use crate::rollback::monitor::{self, DockerHealthProbe, POLL_INTERVAL};
use crate::rollback::store::CheckpointStore;
use crate::server::serve::serve;
use crate::server::state::ServerState;

/// Run the Winforge server
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), AppError> {
    info!("Initializing Winforge server...");

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);

    let checkpoints = Arc::new(CheckpointStore::new(&options.storage.snapshot_root));
    if let Err(e) = checkpoints.load_from_disk().await {
        warn!("Failed to load checkpoints from disk: {}", e);
    }

    let probe: Arc<dyn monitor::HealthProbe> = Arc::new(DockerHealthProbe::default());

    // Checkpoints left active by a previous run resume monitoring; most will
    // already be past their deadline and roll back on the first poll.
    for checkpoint in checkpoints.active().await {
        info!(id = %checkpoint.id, "Resuming monitor for active checkpoint");
        monitor::spawn_monitor(
            checkpoints.clone(),
            probe.clone(),
            checkpoint,
            POLL_INTERVAL,
        )
        .await;
    }

    let assistant = Arc::new(Assistant::new(AssistantConfig::from_env())?);
    let state = Arc::new(ServerState::new(
        options.storage.output_root.clone(),
        DirectDockerDeployer::new(options.docker_host.clone()),
        checkpoints.clone(),
        probe,
        assistant,
    ));

    spawn_cleanup_worker(checkpoints, &options, shutdown_tx.subscribe());

    let server_shutdown = {
        let mut rx = shutdown_tx.subscribe();
        async move {
            let _ = rx.recv().await;
        }
    };
    let server_handle = serve(&options.server, state, server_shutdown).await?;

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");
    drop(shutdown_tx);

    match tokio::time::timeout(options.max_shutdown_delay, server_handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(AppError::ShutdownError(e.to_string())),
        Err(_) => Err(AppError::ShutdownError(
            "Server did not shut down in time".to_string(),
        )),
    }
}

/// Periodically drop settled checkpoints older than the configured age.
fn spawn_cleanup_worker(
    checkpoints: Arc<CheckpointStore>,
    options: &AppOptions,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let interval = options.cleanup_interval;
    let max_age = match ChronoDuration::from_std(options.checkpoint_max_age) {
        Ok(age) => age,
        Err(e) => {
            error!("Invalid checkpoint max age, cleanup disabled: {}", e);
            return;
        }
    };

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => return,
                _ = tokio::time::sleep(interval) => {
                    checkpoints.cleanup_old(max_age).await;
                }
            }
        }
    });
}
