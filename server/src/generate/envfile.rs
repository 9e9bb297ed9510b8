//! Env-file generation
//!
//! Emits the same variables as the compose document in the same order, but
//! in env-file grammar: values are quoted per `escape::env_file_value`, and
//! a trailing block records the container name and published ports for
//! tooling that reads the env file alone.

use crate::config::schema::GuestConfig;
use crate::generate::{environment_pairs, escape};

/// Render the env file for a configuration record.
pub fn generate(config: &GuestConfig) -> String {
    let mut out = String::new();
    out.push_str("# Windows container environment\n");
    out.push_str(&format!("# Container: {}\n\n", config.container_name()));

    for (key, value) in environment_pairs(config) {
        out.push_str(&format!("{}={}\n", key, escape::env_file_value(&value)));
    }

    out.push_str("\n# Container settings\n");
    out.push_str(&format!(
        "CONTAINER_NAME={}\n",
        escape::env_file_value(config.container_name())
    ));
    out.push_str(&format!(
        "RDP_PORT={}\n",
        escape::env_file_value(&config.rdp_port_or_default())
    ));
    out.push_str(&format!(
        "VNC_PORT={}\n",
        escape::env_file_value(&config.vnc_port_or_default())
    ));

    out
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

    #[test]
    fn test_plain_values_unquoted() {
        let env = generate(&base_config());
        assert!(env.contains("USERNAME=admin\n"));
        assert!(env.contains("VERSION=11e\n"));
        assert!(env.contains("CONTAINER_NAME=win11-test\n"));
        assert!(env.contains("RDP_PORT=3389\n"));
        assert!(env.contains("VNC_PORT=8006\n"));
    }

    #[test]
    fn test_dollar_password_single_quoted_not_doubled() {
        let config = GuestConfig {
            password: "P@$w0rd$x".to_string(),
            ..base_config()
        };
        let env = generate(&config);
        // Env-file grammar has no interpolation pass; the raw value is kept
        // verbatim inside single quotes.
        assert!(env.contains("PASSWORD='P@$w0rd$x'\n"));
        assert!(!env.contains("$$"));
    }

    #[test]
    fn test_spaced_value_double_quoted() {
        let config = GuestConfig {
            snmp_location: Some("Server Room 3".to_string()),
            enable_snmp: true,
            ..base_config()
        };
        let env = generate(&config);
        assert!(env.contains("SNMP_LOCATION=\"Server Room 3\"\n"));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let config = base_config();
        assert_eq!(generate(&config), generate(&config));
    }
}
