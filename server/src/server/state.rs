//! Server state

use std::path::PathBuf;
use std::sync::Arc;

use crate::assist::Assistant;
use crate::deploy::local::DirectDockerDeployer;
use crate::rollback::monitor::HealthProbe;
use crate::rollback::store::CheckpointStore;

/// Server state shared across handlers
pub struct ServerState {
    /// Root directory for generated artifacts
    pub output_root: PathBuf,
    pub deployer: DirectDockerDeployer,
    pub checkpoints: Arc<CheckpointStore>,
    pub probe: Arc<dyn HealthProbe>,
    pub assistant: Arc<Assistant>,
}

impl ServerState {
    pub fn new(
        output_root: PathBuf,
        deployer: DirectDockerDeployer,
        checkpoints: Arc<CheckpointStore>,
        probe: Arc<dyn HealthProbe>,
        assistant: Arc<Assistant>,
    ) -> Self {
        Self {
            output_root,
            deployer,
            checkpoints,
            probe,
            assistant,
        }
    }
}
