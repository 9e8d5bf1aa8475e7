//! Container provider trait and implementations for mbox
//!
//! This crate provides an abstraction over container runtimes (Docker, Podman)
//! with the primitives the instance manager needs: create/start/stop/remove,
//! inspect/list, exec with captured output, wait and image pull.

mod docker;
mod error;
mod types;

pub use docker::DockerProvider;
pub use error::*;
pub use types::*;

use async_trait::async_trait;
use mbox_config::RuntimeConfig;

/// Trait for container providers (Docker, Podman, etc.)
#[async_trait]
pub trait ContainerProvider: Send + Sync {
    /// Pull an image from a registry
    async fn pull(&self, image: &str) -> Result<ImageId>;

    /// Create a container from an image
    async fn create(&self, config: &CreateContainerConfig) -> Result<ContainerId>;

    /// Start a container (already running is success)
    async fn start(&self, id: &ContainerId) -> Result<()>;

    /// Stop a container, killing it after `timeout` seconds (already stopped is success)
    async fn stop(&self, id: &ContainerId, timeout: Option<u32>) -> Result<()>;

    /// Remove a container
    async fn remove(&self, id: &ContainerId, force: bool) -> Result<()>;

    /// Block until the container stops, returning its exit code
    async fn wait(&self, id: &ContainerId) -> Result<i64>;

    /// Execute a command in a running container and capture its output
    async fn exec(&self, id: &ContainerId, config: &ExecConfig) -> Result<ExecResult>;

    /// List containers
    async fn list(&self, all: bool) -> Result<Vec<ContainerInfo>>;

    /// Get detailed information about a container
    async fn inspect(&self, id: &ContainerId) -> Result<ContainerDetails>;
}

/// Factory function to create a provider based on type
pub async fn create_provider(
    provider_type: ProviderType,
    config: &RuntimeConfig,
) -> Result<Box<dyn ContainerProvider>> {
    match provider_type {
        ProviderType::Docker => {
            let provider = DockerProvider::new(&config.docker_socket).await?;
            Ok(Box::new(provider))
        }
        ProviderType::Podman => {
            // Podman is driven through its Docker-compatible API
            let provider = DockerProvider::new_podman(&config.podman_socket).await?;
            Ok(Box::new(provider))
        }
    }
}

/// Create the provider named in the runtime config, with an actionable
/// message when the runtime cannot be reached
pub async fn create_default_provider(config: &RuntimeConfig) -> Result<Box<dyn ContainerProvider>> {
    let provider_type = match config.provider.parse::<ProviderType>() {
        Ok(pt) => pt,
        Err(e) => {
            tracing::warn!("{}, defaulting to docker", e);
            ProviderType::Docker
        }
    };

    let socket_path = match provider_type {
        ProviderType::Podman => &config.podman_socket,
        ProviderType::Docker => &config.docker_socket,
    };

    match create_provider(provider_type, config).await {
        Ok(provider) => Ok(provider),
        Err(e) => {
            let socket_exists = std::path::Path::new(socket_path).exists();
            Err(ProviderError::ConnectionError(format_connection_error(
                provider_type,
                socket_path,
                socket_exists,
                &e,
            )))
        }
    }
}

/// Format a helpful connection error message with actionable instructions
fn format_connection_error(
    provider: ProviderType,
    socket_path: &str,
    socket_exists: bool,
    underlying: &ProviderError,
) -> String {
    let provider_name = match provider {
        ProviderType::Podman => "Podman",
        ProviderType::Docker => "Docker",
    };

    let mut msg = format!("Cannot connect to {}\n\n", provider_name);

    if !socket_exists {
        msg.push_str(&format!(
            "The {} API socket was not found at:\n  {}\n\n",
            provider_name, socket_path
        ));

        match provider {
            ProviderType::Podman => {
                msg.push_str("To enable the Podman socket, run:\n");
                msg.push_str("  systemctl --user enable --now podman.socket\n");
            }
            ProviderType::Docker => {
                msg.push_str("To start Docker, run:\n");
                msg.push_str("  sudo systemctl enable --now docker\n");
            }
        }
    } else {
        msg.push_str(&format!(
            "The socket exists at {} but the daemon is not responding.\n\n",
            socket_path
        ));
        msg.push_str(&format!("Underlying error: {}\n", underlying));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_missing_socket() {
        let msg = format_connection_error(
            ProviderType::Podman,
            "/nonexistent/podman.sock",
            false,
            &ProviderError::Timeout,
        );
        assert!(msg.contains("Cannot connect to Podman"));
        assert!(msg.contains("/nonexistent/podman.sock"));
        assert!(msg.contains("podman.socket"));
    }

    #[test]
    fn test_connection_error_unresponsive_daemon() {
        let msg = format_connection_error(
            ProviderType::Docker,
            "/var/run/docker.sock",
            true,
            &ProviderError::ConnectionError("refused".into()),
        );
        assert!(msg.contains("not responding"));
        assert!(msg.contains("refused"));
    }
}
