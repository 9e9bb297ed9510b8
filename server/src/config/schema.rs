//! Typed guest configuration record
//!
//! One `GuestConfig` is built per request from caller input, normalized once
//! at the boundary (version mapping), and carried immutably through the
//! validator, the topology resolver, and the generators.

use serde::{Deserialize, Deserializer, Serialize};

/// Network mode for the guest container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// Engine default bridge network with published ports
    #[default]
    Bridge,

    /// Share the host network namespace
    Host,

    /// No networking
    None,

    /// Bridge network with a fixed address
    Static,

    /// Externally-created macvlan network
    Macvlan,
}

impl NetworkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkMode::Bridge => "bridge",
            NetworkMode::Host => "host",
            NetworkMode::None => "none",
            NetworkMode::Static => "static",
            NetworkMode::Macvlan => "macvlan",
        }
    }
}

/// A volume mapping, either an explicit host/container pair or a literal
/// `host:container` string passed straight through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VolumeSpec {
    Pair { host: String, container: String },
    Literal(String),
}

impl VolumeSpec {
    pub fn to_compose_string(&self) -> String {
        match self {
            VolumeSpec::Pair { host, container } => format!("{}:{}", host, container),
            VolumeSpec::Literal(s) => s.clone(),
        }
    }
}

/// Desired deployment of one Windows-in-Docker container.
///
/// Numeric-looking fields arrive from a web form and may be either JSON
/// numbers or strings; they are kept as strings here and range-checked by the
/// validator so that non-numeric input surfaces as a validation error rather
/// than a deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestConfig {
    /// Container name (alnum, hyphen, underscore)
    #[serde(default)]
    pub name: String,

    /// Windows version (UI string, normalized to a backend flag)
    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub username: String,

    /// Opaque secret; must survive both serialization targets unmodified
    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub keyboard: Option<String>,

    #[serde(default, deserialize_with = "string_or_number")]
    pub cpu_cores: Option<String>,

    /// RAM in GB
    #[serde(default, deserialize_with = "string_or_number")]
    pub ram_size: Option<String>,

    /// Disk in GB
    #[serde(default, deserialize_with = "string_or_number")]
    pub disk_size: Option<String>,

    #[serde(default, deserialize_with = "string_or_number")]
    pub rdp_port: Option<String>,

    #[serde(default, deserialize_with = "string_or_number")]
    pub vnc_port: Option<String>,

    #[serde(default)]
    pub dns_servers: Option<String>,

    #[serde(default = "default_true")]
    pub enable_kvm: bool,

    #[serde(default)]
    pub debug: bool,

    /// Host path mounted at /storage for persistence
    #[serde(default)]
    pub data_volume: Option<String>,

    #[serde(default)]
    pub additional_volumes: Vec<VolumeSpec>,

    #[serde(default)]
    pub network_mode: NetworkMode,

    /// Bridge network name for static mode
    #[serde(default)]
    pub network_name: Option<String>,

    #[serde(default)]
    pub static_ip: Option<String>,

    #[serde(default)]
    pub gateway: Option<String>,

    #[serde(default)]
    pub subnet_mask: Option<String>,

    #[serde(default)]
    pub macvlan_subnet: Option<String>,

    #[serde(default)]
    pub macvlan_gateway: Option<String>,

    #[serde(default)]
    pub macvlan_parent: Option<String>,

    #[serde(default)]
    pub macvlan_ip: Option<String>,

    #[serde(default)]
    pub macvlan_dhcp: bool,

    #[serde(default)]
    pub macvlan_network_name: Option<String>,

    #[serde(default, deserialize_with = "string_or_number")]
    pub cpu_limit: Option<String>,

    /// Memory limit in GB
    #[serde(default, deserialize_with = "string_or_number")]
    pub memory_limit: Option<String>,

    // SNMP block
    #[serde(default)]
    pub enable_snmp: bool,

    #[serde(default)]
    pub snmp_community: Option<String>,

    #[serde(default, deserialize_with = "string_or_number")]
    pub snmp_port: Option<String>,

    #[serde(default)]
    pub snmp_location: Option<String>,

    #[serde(default)]
    pub snmp_contact: Option<String>,

    /// Multiline trap destinations, flattened to a comma-separated list
    #[serde(default)]
    pub snmp_trap_destinations: Option<String>,

    // Remote logging block
    #[serde(default)]
    pub enable_logging: bool,

    #[serde(default)]
    pub log_server_host: Option<String>,

    #[serde(default, deserialize_with = "string_or_number")]
    pub log_server_port: Option<String>,

    #[serde(default)]
    pub log_protocol: Option<String>,

    #[serde(default)]
    pub log_format: Option<String>,

    #[serde(default)]
    pub log_windows_events: bool,

    #[serde(default)]
    pub log_snmp_traps: bool,

    #[serde(default)]
    pub log_performance_metrics: bool,

    #[serde(default)]
    pub log_application_traces: bool,

    // Rollback safety net
    #[serde(default)]
    pub enable_rollback: bool,

    /// Minutes before an unconfirmed change rolls back; unset falls back to
    /// the per-type default table
    #[serde(default)]
    pub rollback_timeout: Option<u64>,
}

fn default_true() -> bool {
    true
}

// `enable_kvm` defaults to true on both construction paths, so the derive
// (which would say false) cannot be used.
impl Default for GuestConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            version: String::new(),
            username: String::new(),
            password: String::new(),
            language: None,
            keyboard: None,
            cpu_cores: None,
            ram_size: None,
            disk_size: None,
            rdp_port: None,
            vnc_port: None,
            dns_servers: None,
            enable_kvm: true,
            debug: false,
            data_volume: None,
            additional_volumes: Vec::new(),
            network_mode: NetworkMode::default(),
            network_name: None,
            static_ip: None,
            gateway: None,
            subnet_mask: None,
            macvlan_subnet: None,
            macvlan_gateway: None,
            macvlan_parent: None,
            macvlan_ip: None,
            macvlan_dhcp: false,
            macvlan_network_name: None,
            cpu_limit: None,
            memory_limit: None,
            enable_snmp: false,
            snmp_community: None,
            snmp_port: None,
            snmp_location: None,
            snmp_contact: None,
            snmp_trap_destinations: None,
            enable_logging: false,
            log_server_host: None,
            log_server_port: None,
            log_protocol: None,
            log_format: None,
            log_windows_events: false,
            log_snmp_traps: false,
            log_performance_metrics: false,
            log_application_traces: false,
            enable_rollback: false,
            rollback_timeout: None,
        }
    }
}

impl GuestConfig {
    /// Container name, falling back to the historical default.
    pub fn container_name(&self) -> &str {
        if self.name.is_empty() {
            "windows"
        } else {
            &self.name
        }
    }

    /// RDP port with default.
    pub fn rdp_port_or_default(&self) -> String {
        self.rdp_port.clone().unwrap_or_else(|| "3389".to_string())
    }

    /// VNC port with default.
    pub fn vnc_port_or_default(&self) -> String {
        self.vnc_port.clone().unwrap_or_else(|| "8006".to_string())
    }
}

/// Accept either a JSON string or number for numeric-ish form fields.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
        Float(f64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Str(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(f) => f.to_string(),
    }))
}
