//! Network topology resolver
//!
//! Derives the network-related portions of the compose document from the
//! configured network mode. Subnet math is best-effort: anything missing or
//! malformed falls back to a fixed default rather than failing generation.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use tracing::warn;

use crate::config::schema::{GuestConfig, NetworkMode};
use crate::generate::escape;

/// Fallback subnet used whenever IP or mask is missing or malformed.
pub const DEFAULT_SUBNET: &str = "172.20.0.0/16";

/// Default bridge network name for static-IP deployments.
pub const DEFAULT_NETWORK_NAME: &str = "winforge-net";

/// Default name of the externally-created macvlan network.
pub const DEFAULT_MACVLAN_NAME: &str = "macvlan";

/// Resolved network topology consumed by the compose generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkTopology {
    /// Engine default bridge network with published ports
    Default,

    /// Bare network-mode string (host/none)
    Mode(&'static str),

    /// Bridge network with a computed subnet and a fixed container address
    Static {
        network_name: String,
        subnet: String,
        gateway: Option<String>,
        address: Option<String>,
    },

    /// Reference to an externally-created macvlan network
    Macvlan {
        network_name: String,
        address: Option<String>,
    },
}

/// Resolve the network topology for a configuration record.
pub fn resolve(config: &GuestConfig) -> NetworkTopology {
    match config.network_mode {
        NetworkMode::Bridge => NetworkTopology::Default,
        NetworkMode::Host => NetworkTopology::Mode("host"),
        NetworkMode::None => NetworkTopology::Mode("none"),
        NetworkMode::Static => NetworkTopology::Static {
            network_name: config
                .network_name
                .clone()
                .unwrap_or_else(|| DEFAULT_NETWORK_NAME.to_string()),
            subnet: calculate_subnet(
                config.static_ip.as_deref().unwrap_or(""),
                config.subnet_mask.as_deref().unwrap_or("255.255.255.0"),
            ),
            gateway: config.gateway.clone(),
            address: config.static_ip.clone(),
        },
        NetworkMode::Macvlan => NetworkTopology::Macvlan {
            network_name: config
                .macvlan_network_name
                .clone()
                .unwrap_or_else(|| DEFAULT_MACVLAN_NAME.to_string()),
            address: config.macvlan_ip.clone(),
        },
    }
}

/// Compute the CIDR subnet from a dotted-quad IP and mask.
///
/// The network address is the bitwise AND of IP and mask; the prefix length
/// is the mask's popcount. Missing or malformed input yields the fallback.
pub fn calculate_subnet(ip_address: &str, subnet_mask: &str) -> String {
    if ip_address.is_empty() || subnet_mask.is_empty() {
        return DEFAULT_SUBNET.to_string();
    }

    let (Ok(ip), Ok(mask)) = (
        ip_address.parse::<Ipv4Addr>(),
        subnet_mask.parse::<Ipv4Addr>(),
    ) else {
        warn!(ip = %ip_address, mask = %subnet_mask, "Unresolvable subnet, using default");
        return DEFAULT_SUBNET.to_string();
    };

    let mask_bits = u32::from(mask);
    let network = Ipv4Addr::from(u32::from(ip) & mask_bits);
    let prefix = mask_bits.count_ones() as u8;

    match Ipv4Net::new(network, prefix) {
        Ok(net) => net.to_string(),
        Err(_) => DEFAULT_SUBNET.to_string(),
    }
}

/// Render the one-shot operator script that creates the external macvlan
/// network. The resolver never creates the network itself.
pub fn macvlan_setup_script(config: &GuestConfig) -> Option<String> {
    if config.network_mode != NetworkMode::Macvlan {
        return None;
    }

    let subnet = config.macvlan_subnet.as_deref()?;
    let gateway = config.macvlan_gateway.as_deref()?;
    let parent = config.macvlan_parent.as_deref()?;
    let network_name = config
        .macvlan_network_name
        .as_deref()
        .unwrap_or(DEFAULT_MACVLAN_NAME);

    let mut script = String::from("#!/bin/sh\n");
    script.push_str("# One-time macvlan network setup. Run on the Docker host before\n");
    script.push_str("# deploying; the generated compose file references this network\n");
    script.push_str("# as external.\n\n");
    script.push_str("docker network create -d macvlan \\\n");
    script.push_str(&format!("  --subnet {} \\\n", escape::shell_single_quote(subnet)));
    script.push_str(&format!("  --gateway {} \\\n", escape::shell_single_quote(gateway)));

    if !config.macvlan_dhcp {
        if let Some(ip) = config.macvlan_ip.as_deref() {
            script.push_str(&format!(
                "  --ip-range {} \\\n",
                escape::shell_single_quote(&format!("{}/32", ip))
            ));
            script.push_str(&format!(
                "  --aux-address {} \\\n",
                escape::shell_single_quote(&format!("host={}", ip))
            ));
        }
    }

    script.push_str(&format!("  -o parent={} \\\n", escape::shell_single_quote(parent)));
    script.push_str(&format!("  {}\n", escape::shell_single_quote(network_name)));

    Some(script)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subnet_from_ip_and_mask() {
        assert_eq!(
            calculate_subnet("192.168.1.10", "255.255.255.0"),
            "192.168.1.0/24"
        );
        assert_eq!(calculate_subnet("10.1.2.3", "255.255.0.0"), "10.1.0.0/16");
    }

    #[test]
    fn test_subnet_fallbacks() {
        assert_eq!(calculate_subnet("", "255.255.255.0"), DEFAULT_SUBNET);
        assert_eq!(calculate_subnet("192.168.1.10", ""), DEFAULT_SUBNET);
        assert_eq!(calculate_subnet("not-an-ip", "255.255.255.0"), DEFAULT_SUBNET);
        assert_eq!(calculate_subnet("192.168.1.10", "bogus"), DEFAULT_SUBNET);
    }

    #[test]
    fn test_resolve_modes() {
        let config = GuestConfig {
            network_mode: NetworkMode::Host,
            ..Default::default()
        };
        assert_eq!(resolve(&config), NetworkTopology::Mode("host"));

        let config = GuestConfig::default();
        assert_eq!(resolve(&config), NetworkTopology::Default);
    }

    #[test]
    fn test_resolve_static() {
        let config = GuestConfig {
            network_mode: NetworkMode::Static,
            static_ip: Some("192.168.1.10".to_string()),
            subnet_mask: Some("255.255.255.0".to_string()),
            gateway: Some("192.168.1.1".to_string()),
            ..Default::default()
        };
        match resolve(&config) {
            NetworkTopology::Static {
                network_name,
                subnet,
                gateway,
                address,
            } => {
                assert_eq!(network_name, DEFAULT_NETWORK_NAME);
                assert_eq!(subnet, "192.168.1.0/24");
                assert_eq!(gateway.as_deref(), Some("192.168.1.1"));
                assert_eq!(address.as_deref(), Some("192.168.1.10"));
            }
            other => panic!("unexpected topology: {:?}", other),
        }
    }

    #[test]
    fn test_macvlan_setup_script() {
        let config = GuestConfig {
            network_mode: NetworkMode::Macvlan,
            macvlan_subnet: Some("192.168.1.0/24".to_string()),
            macvlan_gateway: Some("192.168.1.1".to_string()),
            macvlan_parent: Some("eth0".to_string()),
            macvlan_ip: Some("192.168.1.50".to_string()),
            ..Default::default()
        };
        let script = macvlan_setup_script(&config).unwrap();
        assert!(script.starts_with("#!/bin/sh"));
        assert!(script.contains("--subnet '192.168.1.0/24'"));
        assert!(script.contains("--ip-range '192.168.1.50/32'"));
        assert!(script.contains("-o parent='eth0'"));

        // Not emitted for other modes or missing required fields
        assert!(macvlan_setup_script(&GuestConfig::default()).is_none());
        let incomplete = GuestConfig {
            network_mode: NetworkMode::Macvlan,
            macvlan_subnet: Some("192.168.1.0/24".to_string()),
            ..Default::default()
        };
        assert!(macvlan_setup_script(&incomplete).is_none());
    }
}
