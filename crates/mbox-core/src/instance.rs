//! Instance identity and the uniform view returned to callers

use crate::{CoreError, Result};
use mbox_provider::ContainerStatus;
use serde::Serialize;

/// Label marking containers created by mbox
pub const MANAGED_LABEL: &str = "mbox.managed";
/// Label carrying the user-chosen instance name
pub const NAME_LABEL: &str = "mbox.name";

/// Status of a game-server instance, derived from the runtime on every read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceStatus {
    Creating,
    Running,
    Stopped,
    Removed,
    NotFound,
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Creating => write!(f, "creating"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Removed => write!(f, "removed"),
            Self::NotFound => write!(f, "not-found"),
        }
    }
}

impl From<ContainerStatus> for InstanceStatus {
    fn from(status: ContainerStatus) -> Self {
        match status {
            ContainerStatus::Created => Self::Creating,
            ContainerStatus::Running | ContainerStatus::Restarting => Self::Running,
            ContainerStatus::Paused | ContainerStatus::Exited | ContainerStatus::Dead => {
                Self::Stopped
            }
            ContainerStatus::Removing => Self::Removed,
            ContainerStatus::Unknown => Self::NotFound,
        }
    }
}

/// Uniform description of one instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    /// Canonical id (prefix + name), also the container name
    pub id: String,
    pub name: String,
    /// Runtime-assigned container id
    pub container_id: String,
    pub status: InstanceStatus,
    pub version: String,
    pub memory: Option<String>,
    pub image: String,
    pub port: Option<u16>,
    /// Online players; `None` when not running or the lookup failed
    pub players: Option<Vec<String>>,
}

/// Canonical instance id for `name`
pub fn canonical_id(prefix: &str, name: &str) -> String {
    format!("{}{}", prefix, name)
}

/// User-facing name for a canonical id
pub fn display_name<'a>(prefix: &str, id: &'a str) -> &'a str {
    id.strip_prefix(prefix).unwrap_or(id)
}

/// Instance names must be valid container-name suffixes and safe directory names
pub fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let first = chars
        .next()
        .ok_or_else(|| CoreError::InvalidArgument("instance name must not be empty".into()))?;

    if !first.is_ascii_alphanumeric() {
        return Err(CoreError::InvalidArgument(format!(
            "instance name '{}' must start with a letter or digit",
            name
        )));
    }
    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))) {
        return Err(CoreError::InvalidArgument(format!(
            "instance name '{}' contains invalid character '{}'",
            name, bad
        )));
    }
    Ok(())
}

/// Repository part of an image reference (`itzg/minecraft-server:latest` -> `itzg/minecraft-server`)
pub fn image_repository(image: &str) -> &str {
    let image = image.split_once('@').map(|(repo, _)| repo).unwrap_or(image);
    match image.rfind(':') {
        // A colon before the last slash belongs to a registry port
        Some(idx) if !image[idx..].contains('/') => &image[..idx],
        _ => image,
    }
}
