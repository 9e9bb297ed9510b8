//! Checkpoint and rollback safety net
//!
//! Risky changes (deployments, network rework) get a checkpoint: a snapshot
//! of host state plus a background monitor. The operator confirms the change
//! within its window or it is undone automatically.

pub mod checkpoint;
pub mod monitor;
pub mod snapshot;
pub mod store;
