//! Global configuration for mbox
//!
//! Located at `~/.config/mbox/config.toml`, or wherever `MBOX_CONFIG` points.

use crate::{ConfigError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "MBOX_CONFIG";

/// Environment variable overriding `instances.data_path`
pub const DATA_PATH_ENV: &str = "DATA_PATH";

/// Global mbox configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub instances: InstancesConfig,
    pub runtime: RuntimeConfig,
}

/// How per-instance data directories are created and removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionerKind {
    /// Directly on the local filesystem
    #[default]
    Local,
    /// Through a short-lived helper container (when mbox itself runs in a container)
    Container,
}

/// Settings for managed game-server instances
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstancesConfig {
    /// Host directory holding one data directory per instance
    pub data_path: PathBuf,
    /// First host port handed out to instances
    pub port_start: u16,
    /// Last host port handed out to instances (inclusive)
    pub port_end: u16,
    /// Prefix prepended to instance names to form container names
    pub name_prefix: String,
    /// Game-server image
    pub image: String,
    /// Port the game server listens on inside the container
    pub service_port: u16,
    /// Memory limit passed to the server when none is requested
    pub default_memory: String,
    /// Server content variant (`TYPE` env value)
    pub server_type: String,
    /// Grace period before a stopping server is killed
    pub stop_timeout_secs: u32,
    /// Deadline for a single container runtime call
    pub call_timeout_secs: u64,
    /// Pull the server image before every create
    pub pull_image: bool,
    pub provisioner: ProvisionerKind,
    /// Image used by the container provisioner
    pub helper_image: String,
    /// Console commands allowed through `exec` (empty allows everything)
    pub allowed_commands: Vec<String>,
}

impl Default for InstancesConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            port_start: 25565,
            port_end: 25575,
            name_prefix: "mboxmini-".to_string(),
            image: "itzg/minecraft-server:latest".to_string(),
            service_port: 25565,
            default_memory: "2G".to_string(),
            server_type: "VANILLA".to_string(),
            stop_timeout_secs: 30,
            call_timeout_secs: 120,
            pull_image: true,
            provisioner: ProvisionerKind::Local,
            helper_image: "alpine:latest".to_string(),
            allowed_commands: Vec::new(),
        }
    }
}

impl InstancesConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.stop_timeout_secs))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Number of ports in the configured range
    pub fn port_count(&self) -> usize {
        if self.port_start > self.port_end {
            0
        } else {
            usize::from(self.port_end - self.port_start) + 1
        }
    }
}

fn default_data_path() -> PathBuf {
    ProjectDirs::from("", "", "mbox")
        .map(|dirs| dirs.data_dir().join("servers"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/mbox/servers"))
}

/// Container runtime connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Container provider ("docker" or "podman")
    pub provider: String,
    /// Docker socket path
    pub docker_socket: String,
    /// Podman socket path
    pub podman_socket: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            provider: "docker".to_string(),
            docker_socket: default_docker_socket(),
            podman_socket: default_podman_socket(),
        }
    }
}

#[cfg(windows)]
fn default_docker_socket() -> String {
    "//./pipe/docker_engine".to_string()
}

#[cfg(not(windows))]
fn default_docker_socket() -> String {
    "/var/run/docker.sock".to_string()
}

#[cfg(target_os = "linux")]
fn default_podman_socket() -> String {
    std::env::var("XDG_RUNTIME_DIR")
        .map(|dir| format!("{}/podman/podman.sock", dir))
        .unwrap_or_else(|_| "/run/user/1000/podman/podman.sock".to_string())
}

#[cfg(target_os = "macos")]
fn default_podman_socket() -> String {
    dirs::home_dir()
        .map(|h| {
            format!(
                "{}/.local/share/containers/podman/machine/podman-machine-default/podman.sock",
                h.display()
            )
        })
        .unwrap_or_else(|| "/var/run/podman.sock".to_string())
}

#[cfg(windows)]
fn default_podman_socket() -> String {
    "//./pipe/podman-machine-default".to_string()
}

impl GlobalConfig {
    /// Load configuration from `MBOX_CONFIG` or the default path, then apply
    /// environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::active_path()?)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        tracing::debug!(
            "Loaded config from {:?}: ports {}-{}, data_path={:?}",
            path,
            config.instances.port_start,
            config.instances.port_end,
            config.instances.data_path
        );

        Ok(config)
    }

    /// `DATA_PATH` replaces the configured data root when set and non-empty
    pub fn apply_env_overrides(&mut self) {
        if let Some(path) = std::env::var_os(DATA_PATH_ENV).filter(|p| !p.is_empty()) {
            self.instances.data_path = PathBuf::from(path);
        }
    }

    /// Reject settings the instance manager cannot work with
    pub fn validate(&self) -> Result<()> {
        let inst = &self.instances;
        if inst.port_start == 0 || inst.port_start > inst.port_end {
            return Err(ConfigError::Invalid(format!(
                "port range {}-{} is empty",
                inst.port_start, inst.port_end
            )));
        }
        if inst.service_port == 0 {
            return Err(ConfigError::Invalid("service_port must be non-zero".into()));
        }
        if inst.name_prefix.is_empty() {
            return Err(ConfigError::Invalid("name_prefix must not be empty".into()));
        }
        if inst.image.is_empty() {
            return Err(ConfigError::Invalid("image must not be empty".into()));
        }
        if !inst.data_path.is_absolute() {
            return Err(ConfigError::Invalid(format!(
                "data_path {:?} must be absolute",
                inst.data_path
            )));
        }
        match self.runtime.provider.as_str() {
            "docker" | "podman" => Ok(()),
            other => Err(ConfigError::Invalid(format!("unknown provider '{}'", other))),
        }
    }

    /// Save configuration to the file `load` reads
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::active_path()?)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Config file in use: `MBOX_CONFIG` if set, else the default path
    pub fn active_path() -> Result<PathBuf> {
        match std::env::var_os(CONFIG_ENV) {
            Some(p) if !p.is_empty() => Ok(PathBuf::from(p)),
            _ => Self::config_path(),
        }
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "mbox").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}
