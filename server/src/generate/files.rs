//! Writing generated artifacts to disk

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::config::schema::GuestConfig;
use crate::errors::AppError;
use crate::generate::{compose, envfile, network};

/// Locations of the artifacts written for one configuration record.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedPaths {
    pub compose_file: PathBuf,
    pub env_file: PathBuf,
    pub config_file: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macvlan_script: Option<PathBuf>,
}

/// Generate and write all artifacts for a configuration record into
/// `output_dir`, prefixed with the container name.
///
/// Always writes the compose file, env file, and a JSON copy of the input
/// record; macvlan deployments additionally get the network setup script,
/// marked executable.
pub async fn save_config_files(
    config: &GuestConfig,
    output_dir: &Path,
) -> Result<GeneratedPaths, AppError> {
    tokio::fs::create_dir_all(output_dir).await?;
    let name = config.container_name();

    let compose_file = output_dir.join(format!("{}-docker-compose.yml", name));
    tokio::fs::write(&compose_file, compose::generate(config)?).await?;

    let env_file = output_dir.join(format!("{}.env", name));
    tokio::fs::write(&env_file, envfile::generate(config)).await?;

    let config_file = output_dir.join(format!("{}-config.json", name));
    tokio::fs::write(&config_file, serde_json::to_string_pretty(config)?).await?;

    let macvlan_script = match network::macvlan_setup_script(config) {
        Some(script) => {
            let path = output_dir.join(format!("{}-setup-macvlan.sh", name));
            tokio::fs::write(&path, script).await?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).await?;
            }
            Some(path)
        }
        None => None,
    };

    info!(directory = %output_dir.display(), container = name, "Wrote configuration artifacts");

    Ok(GeneratedPaths {
        compose_file,
        env_file,
        config_file,
        macvlan_script,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::NetworkMode;

    fn base_config() -> GuestConfig {
        GuestConfig {
            name: "win11-test".to_string(),
            version: "11e".to_string(),
            username: "admin".to_string(),
            password: "P@ssw0rd123".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_writes_all_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let paths = save_config_files(&base_config(), dir.path()).await.unwrap();

        assert!(paths.compose_file.ends_with("win11-test-docker-compose.yml"));
        assert!(paths.compose_file.exists());
        assert!(paths.env_file.exists());
        assert!(paths.config_file.exists());
        assert!(paths.macvlan_script.is_none());

        let compose = tokio::fs::read_to_string(&paths.compose_file).await.unwrap();
        assert!(compose.contains("dockurr/windows:11e"));
        let env = tokio::fs::read_to_string(&paths.env_file).await.unwrap();
        assert!(env.contains("USERNAME=admin"));
    }

    #[tokio::test]
    async fn test_macvlan_script_is_executable() {
        let config = GuestConfig {
            network_mode: NetworkMode::Macvlan,
            macvlan_subnet: Some("192.168.1.0/24".to_string()),
            macvlan_gateway: Some("192.168.1.1".to_string()),
            macvlan_parent: Some("eth0".to_string()),
            ..base_config()
        };
        let dir = tempfile::tempdir().unwrap();
        let paths = save_config_files(&config, dir.path()).await.unwrap();
        let script = paths.macvlan_script.unwrap();
        assert!(script.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&script).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }
}
