//! End-to-end generation tests
//!
//! Follows one configuration record through every grammar a secret crosses:
//! compose YAML, env file, and the translated run invocation.

use winforge::config::schema::{GuestConfig, NetworkMode};
use winforge::config::validate;
use winforge::config::versions;
use winforge::deploy::invocation::RunInvocation;
use winforge::generate::{compose, envfile, files};

fn tricky_config() -> GuestConfig {
    GuestConfig {
        name: "win11-test".to_string(),
        version: "11-enterprise".to_string(),
        username: "admin".to_string(),
        password: "P@$w0rd$x".to_string(),
        ram_size: Some("8".to_string()),
        cpu_cores: Some("4".to_string()),
        disk_size: Some("64".to_string()),
        ..Default::default()
    }
}

#[test]
fn password_survives_every_grammar() {
    let mut config = tricky_config();
    versions::apply_version_mapping(&mut config);
    assert_eq!(config.version, "11e");

    let report = validate::validate(&config);
    assert!(report.valid, "errors: {:?}", report.errors);

    // Compose grammar: dollars doubled for the reader's interpolation pass
    let yaml = compose::generate(&config).unwrap();
    assert!(yaml.contains("P@$$w0rd$$x"));
    assert!(!yaml.contains("P@$w0rd$x"));
    assert!(yaml.contains("VERSION: 11e"));

    // Env-file grammar: raw value inside single quotes, never doubled
    let env = envfile::generate(&config);
    assert!(env.contains("PASSWORD='P@$w0rd$x'"));
    assert!(!env.contains("$$"));

    // Run-invocation grammar: parsing the compose document back restores
    // the original secret byte for byte
    let parsed = compose::parse(&yaml).unwrap();
    let invocation = RunInvocation::from_compose(&parsed).unwrap();
    assert!(invocation
        .args
        .contains(&"PASSWORD=P@$w0rd$x".to_string()));

    // And the remote command line carries it inside transport quoting
    let command = invocation.to_shell_command();
    assert!(command.contains("'PASSWORD=P@$w0rd$x'"));
}

#[test]
fn generation_is_deterministic() {
    let mut config = tricky_config();
    versions::apply_version_mapping(&mut config);

    assert_eq!(
        compose::generate(&config).unwrap(),
        compose::generate(&config).unwrap()
    );
    assert_eq!(envfile::generate(&config), envfile::generate(&config));
}

#[test]
fn static_network_flows_into_both_artifacts() {
    let mut config = GuestConfig {
        network_mode: NetworkMode::Static,
        static_ip: Some("192.168.1.10".to_string()),
        subnet_mask: Some("255.255.255.0".to_string()),
        gateway: Some("192.168.1.1".to_string()),
        ..tricky_config()
    };
    versions::apply_version_mapping(&mut config);

    let yaml = compose::generate(&config).unwrap();
    assert!(yaml.contains("subnet: 192.168.1.0/24"));
    assert!(yaml.contains("ipv4_address: 192.168.1.10"));

    let env = envfile::generate(&config);
    assert!(env.contains("IP=192.168.1.10"));
    assert!(env.contains("GATEWAY=192.168.1.1"));
    assert!(env.contains("NETMASK=255.255.255.0"));
}

#[tokio::test]
async fn artifacts_written_to_disk_match_rendered_text() {
    let mut config = tricky_config();
    versions::apply_version_mapping(&mut config);

    let dir = tempfile::tempdir().unwrap();
    let paths = files::save_config_files(&config, dir.path()).await.unwrap();

    let written = tokio::fs::read_to_string(&paths.compose_file).await.unwrap();
    assert_eq!(written, compose::generate(&config).unwrap());

    let written = tokio::fs::read_to_string(&paths.env_file).await.unwrap();
    assert_eq!(written, envfile::generate(&config));

    // The JSON copy round-trips to the same record
    let raw = tokio::fs::read_to_string(&paths.config_file).await.unwrap();
    let restored: GuestConfig = serde_json::from_str(&raw).unwrap();
    assert_eq!(restored.password, config.password);
    assert_eq!(restored.version, "11e");
}

#[tokio::test]
async fn macvlan_deployment_writes_setup_script() {
    let mut config = GuestConfig {
        network_mode: NetworkMode::Macvlan,
        macvlan_subnet: Some("192.168.1.0/24".to_string()),
        macvlan_gateway: Some("192.168.1.1".to_string()),
        macvlan_parent: Some("eth0".to_string()),
        macvlan_ip: Some("192.168.1.50".to_string()),
        ..tricky_config()
    };
    versions::apply_version_mapping(&mut config);

    let dir = tempfile::tempdir().unwrap();
    let paths = files::save_config_files(&config, dir.path()).await.unwrap();

    let script_path = paths.macvlan_script.expect("macvlan script missing");
    let script = tokio::fs::read_to_string(&script_path).await.unwrap();
    assert!(script.contains("docker network create -d macvlan"));
    assert!(script.contains("--subnet '192.168.1.0/24'"));

    // Macvlan guests publish no host ports
    let yaml = tokio::fs::read_to_string(&paths.compose_file).await.unwrap();
    assert!(!yaml.contains("3389"));
}
