//! Configuration generation: compose document, env file, and output files
//!
//! Generation is a pure function of a validated configuration record; calling
//! twice with the same input yields byte-identical output. The one side
//! effect, `files::save_config_files`, is explicit.

pub mod compose;
pub mod envfile;
pub mod escape;
pub mod files;
pub mod network;

use crate::config::schema::{GuestConfig, NetworkMode};

/// Environment variables for the guest, as raw (unescaped) key/value pairs.
///
/// Emitted in a fixed order so diffs between two generations stay minimal:
/// identity, display/locale, compute/storage, network, optional SNMP block,
/// optional logging block. Target-grammar escaping is applied by the compose
/// and env-file generators, never here.
pub fn environment_pairs(config: &GuestConfig) -> Vec<(String, String)> {
    let mut vars: Vec<(String, String)> = Vec::new();
    let mut push = |key: &str, value: String| vars.push((key.to_string(), value));

    // Identity
    if !config.version.is_empty() {
        push("VERSION", config.version.clone());
    }
    if !config.username.is_empty() {
        push("USERNAME", config.username.clone());
    }
    if !config.password.is_empty() {
        push("PASSWORD", config.password.clone());
    }

    // Display and locale
    if let Some(language) = &config.language {
        push("LANGUAGE", language.clone());
    }
    if let Some(keyboard) = &config.keyboard {
        push("KEYBOARD", keyboard.clone());
    }

    // Compute and storage
    if let Some(cpu_cores) = &config.cpu_cores {
        push("CPU_CORES", cpu_cores.clone());
    }
    if let Some(ram_size) = &config.ram_size {
        push("RAM_SIZE", format!("{}G", ram_size));
    }
    if let Some(disk_size) = &config.disk_size {
        push("DISK_SIZE", format!("{}G", disk_size));
    }
    if config.enable_kvm {
        push("KVM", "Y".to_string());
    }
    if config.debug {
        push("DEBUG", "Y".to_string());
    }

    // Network
    if let Some(dns) = &config.dns_servers {
        push("DNS", dns.clone());
    }
    if config.network_mode == NetworkMode::Static {
        if let Some(ip) = &config.static_ip {
            push("IP", ip.clone());
        }
        if let Some(gateway) = &config.gateway {
            push("GATEWAY", gateway.clone());
        }
        if let Some(mask) = &config.subnet_mask {
            push("NETMASK", mask.clone());
        }
    }

    // SNMP block
    if config.enable_snmp {
        push("SNMP_ENABLED", "Y".to_string());
        if let Some(community) = &config.snmp_community {
            push("SNMP_COMMUNITY", community.clone());
        }
        if let Some(port) = &config.snmp_port {
            push("SNMP_PORT", port.clone());
        }
        if let Some(location) = &config.snmp_location {
            push("SNMP_LOCATION", location.clone());
        }
        if let Some(contact) = &config.snmp_contact {
            push("SNMP_CONTACT", contact.clone());
        }
        if let Some(traps) = &config.snmp_trap_destinations {
            // Multiline form input becomes a comma-separated list
            push("SNMP_TRAPS", traps.trim().replace('\n', ","));
        }
    }

    // Remote logging block
    if config.enable_logging {
        push("LOGGING_ENABLED", "Y".to_string());
        if let Some(host) = &config.log_server_host {
            push("LOG_SERVER", host.clone());
        }
        if let Some(port) = &config.log_server_port {
            push("LOG_PORT", port.clone());
        }
        if let Some(protocol) = &config.log_protocol {
            push("LOG_PROTOCOL", protocol.clone());
        }
        if let Some(format) = &config.log_format {
            push("LOG_FORMAT", format.clone());
        }

        let mut sources = Vec::new();
        if config.log_windows_events {
            sources.push("windows_events");
        }
        if config.log_snmp_traps {
            sources.push("snmp_traps");
        }
        if config.log_performance_metrics {
            sources.push("performance_metrics");
        }
        if config.log_application_traces {
            sources.push("application_traces");
        }
        if !sources.is_empty() {
            push("LOG_SOURCES", sources.join(","));
        }
    }

    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_order_is_stable() {
        let config = GuestConfig {
            name: "w".to_string(),
            version: "11".to_string(),
            username: "admin".to_string(),
            password: "secret12".to_string(),
            ram_size: Some("8".to_string()),
            cpu_cores: Some("4".to_string()),
            ..Default::default()
        };
        let pairs = environment_pairs(&config);
        let keys: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec!["VERSION", "USERNAME", "PASSWORD", "CPU_CORES", "RAM_SIZE", "KVM"]
        );
    }

    #[test]
    fn test_ram_and_disk_get_unit_suffix() {
        let config = GuestConfig {
            ram_size: Some("8".to_string()),
            disk_size: Some("64".to_string()),
            enable_kvm: false,
            ..Default::default()
        };
        let vars = environment_pairs(&config);
        assert!(vars.contains(&("RAM_SIZE".to_string(), "8G".to_string())));
        assert!(vars.contains(&("DISK_SIZE".to_string(), "64G".to_string())));
    }

    #[test]
    fn test_snmp_traps_flattened() {
        let config = GuestConfig {
            enable_snmp: true,
            snmp_trap_destinations: Some("10.0.0.1\n10.0.0.2\n".to_string()),
            enable_kvm: false,
            ..Default::default()
        };
        let vars = environment_pairs(&config);
        assert!(vars.contains(&("SNMP_TRAPS".to_string(), "10.0.0.1,10.0.0.2".to_string())));
    }
}
