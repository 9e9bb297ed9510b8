//! Deployment executors
//!
//! Two paths to a running container: the local Docker endpoint, and a remote
//! host over SSH. Both consume the generated compose document and report the
//! same outcome shape.

pub mod invocation;
pub mod local;
pub mod ssh;

use serde::Serialize;

/// Outcome of a successful deployment.
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub container_name: String,
    /// Non-fatal environment findings (missing /dev/kvm and the like)
    pub warnings: Vec<String>,
    /// Trailing engine output, usually the container id
    pub output: String,
}
