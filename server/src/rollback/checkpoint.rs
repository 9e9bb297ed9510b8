//! Checkpoint model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Category of change a checkpoint protects. Each carries its own
/// confirmation window: riskier changes get longer to prove themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// Deploying or replacing a guest container
    Container,

    /// Macvlan network creation or reattachment
    Macvlan,

    /// Other Docker network changes
    Network,

    /// Host-level changes
    System,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Container => "container",
            ChangeType::Macvlan => "macvlan",
            ChangeType::Network => "network",
            ChangeType::System => "system",
        }
    }

    /// Seconds before an unconfirmed change rolls back.
    pub fn default_timeout(&self) -> u64 {
        match self {
            ChangeType::Container => 180,
            ChangeType::Macvlan => 420,
            ChangeType::Network => 300,
            ChangeType::System => 600,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    /// Waiting for confirmation; the monitor is watching
    Active,

    /// Operator confirmed the change; monitor stopped
    Confirmed,

    /// Rolled back, see `rollback_reason`
    RolledBack,

    /// Rollback was attempted and did not complete
    Failed,
}

/// One revertible change and its safety-net state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub change_type: ChangeType,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub timeout_secs: u64,
    pub status: CheckpointStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolled_back_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_reason: Option<String>,
}

impl Checkpoint {
    pub fn new(
        change_type: ChangeType,
        description: impl Into<String>,
        container_name: Option<String>,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            id: format!("{}_{}", change_type.as_str(), created_at.timestamp()),
            change_type,
            description: description.into(),
            created_at,
            timeout_secs: change_type.default_timeout(),
            status: CheckpointStatus::Active,
            container_name,
            confirmed_at: None,
            rolled_back_at: None,
            rollback_reason: None,
        }
    }

    /// Instant after which an unconfirmed checkpoint rolls back.
    pub fn deadline(&self) -> DateTime<Utc> {
        self.created_at + Duration::seconds(self.timeout_secs as i64)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == CheckpointStatus::Active && now > self.deadline()
    }

    /// Seconds until the deadline, clamped at zero.
    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> u64 {
        (self.deadline() - now).num_seconds().max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_scale_with_risk() {
        assert_eq!(ChangeType::Container.default_timeout(), 180);
        assert_eq!(ChangeType::Macvlan.default_timeout(), 420);
        assert_eq!(ChangeType::Network.default_timeout(), 300);
        assert_eq!(ChangeType::System.default_timeout(), 600);
    }

    #[test]
    fn test_id_carries_change_type() {
        let cp = Checkpoint::new(ChangeType::Macvlan, "attach", None);
        assert!(cp.id.starts_with("macvlan_"));
        assert_eq!(cp.status, CheckpointStatus::Active);
    }

    #[test]
    fn test_expiry() {
        let mut cp = Checkpoint::new(ChangeType::Container, "deploy", None);
        let now = Utc::now();
        assert!(!cp.is_expired(now));
        assert!(cp.seconds_remaining(now) <= 180);

        cp.created_at = now - Duration::seconds(181);
        assert!(cp.is_expired(now));
        assert_eq!(cp.seconds_remaining(now), 0);

        cp.status = CheckpointStatus::Confirmed;
        assert!(!cp.is_expired(now));
    }
}
