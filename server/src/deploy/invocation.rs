//! Compose-to-run translation
//!
//! Remote hosts are not guaranteed to have a compose plugin, so a parsed
//! compose service is translated into an imperative `docker run` invocation.
//! Environment values cross out of compose grammar here: the reader's
//! `$$` collapse is applied because no interpolation pass will ever run on
//! an argument vector.

use serde_yaml::Value;

use crate::errors::AppError;
use crate::generate::compose::{ComposeFile, ComposeService};
use crate::generate::escape;

/// An imperative `docker run` invocation equivalent to one compose service.
#[derive(Debug, Clone)]
pub struct RunInvocation {
    pub container_name: String,
    /// Arguments after the `docker` binary, `run` included
    pub args: Vec<String>,
}

impl RunInvocation {
    /// Translate the single service of a parsed compose document.
    pub fn from_compose(file: &ComposeFile) -> Result<Self, AppError> {
        let (service_name, service) = file
            .services
            .iter()
            .next()
            .ok_or_else(|| AppError::DeployError("Compose file defines no services".to_string()))?;

        if file.services.len() > 1 {
            return Err(AppError::DeployError(
                "Compose file defines more than one service".to_string(),
            ));
        }

        Ok(Self::from_service(service_name, service))
    }

    fn from_service(service_name: &str, service: &ComposeService) -> Self {
        let container_name = service
            .container_name
            .clone()
            .unwrap_or_else(|| service_name.to_string());

        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            container_name.clone(),
        ];

        if let Some(restart) = &service.restart {
            args.push("--restart".to_string());
            args.push(restart.clone());
        }

        if let Some(grace) = service.stop_grace_period.as_deref().and_then(parse_duration) {
            args.push("--stop-timeout".to_string());
            args.push(grace.to_string());
        }

        if service.privileged == Some(true) {
            args.push("--privileged".to_string());
        }

        for device in &service.devices {
            args.push("--device".to_string());
            args.push(device.clone());
        }

        for cap in &service.cap_add {
            args.push("--cap-add".to_string());
            args.push(cap.clone());
        }

        for port in &service.ports {
            args.push("-p".to_string());
            args.push(port.clone());
        }

        for volume in &service.volumes {
            args.push("-v".to_string());
            args.push(volume.clone());
        }

        for (key, value) in &service.environment {
            let (Some(key), Some(value)) = (key.as_str(), scalar_to_string(value)) else {
                continue;
            };
            args.push("-e".to_string());
            args.push(format!("{}={}", key, escape::collapse_compose_dollars(&value)));
        }

        if let Some(mode) = &service.network_mode {
            args.push("--network".to_string());
            args.push(mode.clone());
        } else if let Some((network_name, attachment)) = service.networks.iter().next() {
            args.push("--network".to_string());
            args.push(network_name.clone());
            if let Some(address) = &attachment.ipv4_address {
                args.push("--ip".to_string());
                args.push(address.clone());
            }
        }

        if let Some(deploy) = &service.deploy {
            if let Some(cpus) = &deploy.resources.limits.cpus {
                args.push("--cpus".to_string());
                args.push(cpus.clone());
            }
            if let Some(memory) = &deploy.resources.limits.memory {
                args.push("--memory".to_string());
                args.push(memory.clone());
            }
        }

        args.push(service.image.clone());

        RunInvocation {
            container_name,
            args,
        }
    }

    /// Device paths the invocation maps into the container.
    pub fn devices(&self) -> Vec<String> {
        let mut devices = Vec::new();
        let mut args = self.args.iter();
        while let Some(arg) = args.next() {
            if arg == "--device" {
                if let Some(device) = args.next() {
                    devices.push(device.clone());
                }
            }
        }
        devices
    }

    /// Remove device mappings from the invocation. A device declared in the
    /// compose document may simply not exist on the executing host; the guest
    /// then runs without it rather than failing the whole run.
    pub fn drop_devices(&mut self, absent: &[String]) {
        if absent.is_empty() {
            return;
        }
        let old = std::mem::take(&mut self.args);
        let mut args = Vec::with_capacity(old.len());
        let mut iter = old.into_iter();
        while let Some(arg) = iter.next() {
            if arg == "--device" {
                if let Some(device) = iter.next() {
                    if !absent.contains(&device) {
                        args.push(arg);
                        args.push(device);
                    }
                }
            } else {
                args.push(arg);
            }
        }
        self.args = args;
    }

    /// Render a single shell command line for remote execution. Arguments
    /// that the shell would expand get the single-quote pass; the rest stay
    /// bare for readability in logs.
    pub fn to_shell_command(&self) -> String {
        let mut parts = vec!["docker".to_string()];
        for arg in &self.args {
            if escape::needs_shell_quoting(arg) || arg.contains(|c: char| c.is_whitespace()) {
                parts.push(escape::shell_single_quote(arg));
            } else {
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }
}

/// Compose duration string (`120s`, `2m`) to whole seconds.
fn parse_duration(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Some(minutes) = raw.strip_suffix('m') {
        return minutes.parse::<u64>().ok().map(|m| m * 60);
    }
    if let Some(seconds) = raw.strip_suffix('s') {
        return seconds.parse::<u64>().ok();
    }
    raw.parse::<u64>().ok()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
