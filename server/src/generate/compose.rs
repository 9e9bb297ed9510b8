//! Compose document generation
//!
//! The document is built as typed structs and serialized in one pass, so the
//! emitter's quoting rules are applied uniformly. Field declaration order is
//! the emission order. The same structs deserialize parsed operator compose
//! files for translation into run invocations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::config::schema::{GuestConfig, NetworkMode};
use crate::errors::AppError;
use crate::generate::network::{self, NetworkTopology};
use crate::generate::{environment_pairs, escape};

pub const WINDOWS_IMAGE: &str = "dockurr/windows";

/// A compose document with a single guest service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default)]
    pub services: BTreeMap<String, ComposeService>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub networks: BTreeMap<String, TopLevelNetwork>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComposeService {
    #[serde(default)]
    pub image: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,

    /// Insertion-ordered so the emitted block matches the documented layout
    #[serde(default, skip_serializing_if = "Mapping::is_empty")]
    pub environment: Mapping,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cap_add: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub networks: BTreeMap<String, ServiceNetwork>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,

    /// Never set by the generator; accepted when parsing operator files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privileged: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_grace_period: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<DeployBlock>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceNetwork {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_address: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopLevelNetwork {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipam: Option<Ipam>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ipam {
    #[serde(default)]
    pub config: Vec<IpamConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IpamConfig {
    #[serde(default)]
    pub subnet: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
}

/// Build the compose document for a configuration record.
pub fn build(config: &GuestConfig) -> ComposeFile {
    let topology = network::resolve(config);

    let mut environment = Mapping::new();
    for (key, value) in environment_pairs(config) {
        environment.insert(
            Value::String(key),
            Value::String(escape::compose_value(&value)),
        );
    }

    let image = if config.version.is_empty() {
        format!("{}:latest", WINDOWS_IMAGE)
    } else {
        format!("{}:{}", WINDOWS_IMAGE, config.version)
    };

    let mut service = ComposeService {
        image,
        container_name: Some(config.container_name().to_string()),
        environment,
        cap_add: vec!["NET_ADMIN".to_string()],
        stop_grace_period: Some("2m".to_string()),
        restart: Some("on-failure".to_string()),
        ..Default::default()
    };

    if config.enable_kvm {
        service.devices.push("/dev/kvm".to_string());
    }

    // Macvlan guests are reachable on their own LAN address; publishing
    // host ports for them would only shadow the direct route.
    if config.network_mode != NetworkMode::Macvlan {
        service
            .ports
            .push(format!("{}:3389/tcp", config.rdp_port_or_default()));
        service
            .ports
            .push(format!("{}:8006/tcp", config.vnc_port_or_default()));
    }

    if let Some(data) = &config.data_volume {
        if !data.is_empty() {
            service.volumes.push(format!("{}:/storage", data));
        }
    }
    for volume in &config.additional_volumes {
        service.volumes.push(volume.to_compose_string());
    }

    if config.cpu_limit.is_some() || config.memory_limit.is_some() {
        service.deploy = Some(DeployBlock {
            resources: Resources {
                limits: ResourceLimits {
                    cpus: config.cpu_limit.clone(),
                    memory: config.memory_limit.as_ref().map(|m| format!("{}G", m)),
                },
            },
        });
    }

    let mut networks = BTreeMap::new();
    match topology {
        NetworkTopology::Default => {}
        NetworkTopology::Mode(mode) => {
            service.network_mode = Some(mode.to_string());
        }
        NetworkTopology::Static {
            network_name,
            subnet,
            gateway,
            address,
        } => {
            service.networks.insert(
                network_name.clone(),
                ServiceNetwork {
                    ipv4_address: address,
                },
            );
            networks.insert(
                network_name,
                TopLevelNetwork {
                    driver: Some("bridge".to_string()),
                    external: None,
                    ipam: Some(Ipam {
                        config: vec![IpamConfig { subnet, gateway }],
                    }),
                },
            );
        }
        NetworkTopology::Macvlan {
            network_name,
            address,
        } => {
            service.networks.insert(
                network_name.clone(),
                ServiceNetwork {
                    ipv4_address: address,
                },
            );
            networks.insert(
                network_name,
                TopLevelNetwork {
                    driver: None,
                    external: Some(true),
                    ipam: None,
                },
            );
        }
    }

    let mut services = BTreeMap::new();
    services.insert(config.container_name().to_string(), service);

    ComposeFile {
        version: Some("3.8".to_string()),
        services,
        networks,
    }
}

/// Render the compose document to YAML text.
pub fn generate(config: &GuestConfig) -> Result<String, AppError> {
    let file = build(config);
    Ok(serde_yaml::to_string(&file)?)
}

/// Parse an operator-supplied compose document.
pub fn parse(text: &str) -> Result<ComposeFile, AppError> {
    Ok(serde_yaml::from_str(text)?)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployBlock {
    pub resources: Resources,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resources {
    pub limits: ResourceLimits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> GuestConfig {
        GuestConfig {
            name: "win11-test".to_string(),
            version: "11e".to_string(),
            username: "admin".to_string(),
            password: "P@ssw0rd123".to_string(),
            ..Default::default()
        }
    }

    fn env_value<'a>(file: &'a ComposeFile, service: &str, key: &str) -> Option<&'a str> {
        file.services
            .get(service)?
            .environment
            .get(Value::String(key.to_string()))?
            .as_str()
    }

    #[test]
    fn test_basic_service_shape() {
        let file = build(&base_config());
        let service = file.services.get("win11-test").unwrap();
        assert_eq!(service.image, "dockurr/windows:11e");
        assert_eq!(service.container_name.as_deref(), Some("win11-test"));
        assert_eq!(service.devices, vec!["/dev/kvm"]);
        assert_eq!(service.cap_add, vec!["NET_ADMIN"]);
        assert_eq!(service.ports, vec!["3389:3389/tcp", "8006:8006/tcp"]);
        assert_eq!(service.stop_grace_period.as_deref(), Some("2m"));
        assert_eq!(service.restart.as_deref(), Some("on-failure"));
        assert!(file.networks.is_empty());
    }

    #[test]
    fn test_password_dollars_doubled_in_document() {
        let config = GuestConfig {
            password: "P@$w0rd$x".to_string(),
            ..base_config()
        };
        let file = build(&config);
        assert_eq!(
            env_value(&file, "win11-test", "PASSWORD"),
            Some("P@$$w0rd$$x")
        );

        // The rendered YAML carries the doubled form so the compose reader's
        // interpolation pass restores the original.
        let yaml = generate(&config).unwrap();
        assert!(yaml.contains("P@$$w0rd$$x"));
        assert!(!yaml.contains("P@$w0rd$x"));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let config = base_config();
        assert_eq!(generate(&config).unwrap(), generate(&config).unwrap());
    }

    #[test]
    fn test_static_topology_emits_ipam_network() {
        let config = GuestConfig {
            network_mode: NetworkMode::Static,
            static_ip: Some("192.168.1.10".to_string()),
            subnet_mask: Some("255.255.255.0".to_string()),
            gateway: Some("192.168.1.1".to_string()),
            ..base_config()
        };
        let file = build(&config);
        let net = file.networks.get("winforge-net").unwrap();
        assert_eq!(net.driver.as_deref(), Some("bridge"));
        let ipam = net.ipam.as_ref().unwrap();
        assert_eq!(ipam.config[0].subnet, "192.168.1.0/24");
        assert_eq!(ipam.config[0].gateway.as_deref(), Some("192.168.1.1"));

        let service = file.services.get("win11-test").unwrap();
        assert_eq!(
            service.networks.get("winforge-net").unwrap().ipv4_address.as_deref(),
            Some("192.168.1.10")
        );
    }

    #[test]
    fn test_macvlan_topology_external_network_no_ports() {
        let config = GuestConfig {
            network_mode: NetworkMode::Macvlan,
            macvlan_subnet: Some("192.168.1.0/24".to_string()),
            macvlan_gateway: Some("192.168.1.1".to_string()),
            macvlan_parent: Some("eth0".to_string()),
            macvlan_ip: Some("192.168.1.50".to_string()),
            ..base_config()
        };
        let file = build(&config);
        let service = file.services.get("win11-test").unwrap();
        assert!(service.ports.is_empty());
        assert_eq!(file.networks.get("macvlan").unwrap().external, Some(true));
    }

    #[test]
    fn test_host_mode_uses_network_mode_key() {
        let config = GuestConfig {
            network_mode: NetworkMode::Host,
            ..base_config()
        };
        let file = build(&config);
        let service = file.services.get("win11-test").unwrap();
        assert_eq!(service.network_mode.as_deref(), Some("host"));
        assert!(service.networks.is_empty());
    }

    #[test]
    fn test_resource_limits_block() {
        let config = GuestConfig {
            cpu_limit: Some("2".to_string()),
            memory_limit: Some("8".to_string()),
            ..base_config()
        };
        let file = build(&config);
        let limits = &file
            .services
            .get("win11-test")
            .unwrap()
            .deploy
            .as_ref()
            .unwrap()
            .resources
            .limits;
        assert_eq!(limits.cpus.as_deref(), Some("2"));
        assert_eq!(limits.memory.as_deref(), Some("8G"));
    }

    #[test]
    fn test_volumes_and_round_trip_parse() {
        let config = GuestConfig {
            data_volume: Some("/srv/win".to_string()),
            ..base_config()
        };
        let yaml = generate(&config).unwrap();
        let parsed = parse(&yaml).unwrap();
        let service = parsed.services.get("win11-test").unwrap();
        assert_eq!(service.volumes, vec!["/srv/win:/storage"]);
        assert_eq!(
            service
                .environment
                .get(Value::String("USERNAME".to_string()))
                .and_then(Value::as_str),
            Some("admin")
        );
    }
}
