//! Configuration validation
//!
//! Hard failures (`errors`) block generation; advisories (`warnings`) do not.
//! The validator never mutates the record and never panics on malformed
//! string input.

use serde::Serialize;

use crate::config::schema::{GuestConfig, NetworkMode};

/// Validation outcome for a configuration record.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Validate a configuration record.
pub fn validate(config: &GuestConfig) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for (field, value) in [
        ("name", &config.name),
        ("version", &config.version),
        ("username", &config.username),
        ("password", &config.password),
    ] {
        if value.is_empty() {
            errors.push(format!("Missing required field: {}", field));
        }
    }

    if !config.name.is_empty()
        && !config
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        errors.push(
            "Container name can only contain letters, numbers, hyphens, and underscores"
                .to_string(),
        );
    }

    if !config.password.is_empty() && config.password.len() < 8 {
        warnings.push("Password should be at least 8 characters long".to_string());
    }

    check_int_range(
        config.cpu_cores.as_deref(),
        "CPU cores",
        1,
        32,
        &mut errors,
        &mut warnings,
    );
    check_int_range(
        config.ram_size.as_deref(),
        "RAM size",
        2,
        128,
        &mut errors,
        &mut warnings,
    );
    check_int_range(
        config.disk_size.as_deref(),
        "Disk size",
        20,
        1000,
        &mut errors,
        &mut warnings,
    );

    for (field, value) in [
        ("rdp_port", config.rdp_port.as_deref()),
        ("vnc_port", config.vnc_port.as_deref()),
    ] {
        if let Some(raw) = value {
            match raw.parse::<u32>() {
                Ok(port) if !(1024..=65535).contains(&port) => {
                    warnings.push(format!("{} should be between 1024 and 65535", field));
                }
                Ok(_) => {}
                Err(_) => errors.push(format!("{} must be a valid port number", field)),
            }
        }
    }

    if config.network_mode == NetworkMode::Macvlan {
        for (field, value) in [
            ("macvlan_subnet", &config.macvlan_subnet),
            ("macvlan_gateway", &config.macvlan_gateway),
            ("macvlan_parent", &config.macvlan_parent),
        ] {
            if value.as_deref().map_or(true, str::is_empty) {
                errors.push(format!("Missing required field for macvlan mode: {}", field));
            }
        }

        if let Some(ip) = config.macvlan_ip.as_deref() {
            if !is_ipv4(ip) {
                errors.push("macvlan_ip must be a valid IPv4 address".to_string());
            }
        }

        if let Some(subnet) = config.macvlan_subnet.as_deref() {
            if !subnet.is_empty() && !is_cidr(subnet) {
                errors.push("macvlan_subnet must be in CIDR notation (e.g. 192.168.1.0/24)".to_string());
            }
        }
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

fn check_int_range(
    value: Option<&str>,
    label: &str,
    min: i64,
    max: i64,
    errors: &mut Vec<String>,
    warnings: &mut Vec<String>,
) {
    let Some(raw) = value else { return };
    match raw.parse::<i64>() {
        Ok(n) if n < min || n > max => {
            warnings.push(format!("{} should be between {} and {}", label, min, max));
        }
        Ok(_) => {}
        Err(_) => errors.push(format!("{} must be a valid number", label)),
    }
}

fn is_ipv4(value: &str) -> bool {
    value.parse::<std::net::Ipv4Addr>().is_ok()
}

fn is_cidr(value: &str) -> bool {
    value.parse::<ipnet::Ipv4Net>().is_ok()
}
